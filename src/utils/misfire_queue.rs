use log::{info, warn};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

/// Regions whose last fetch produced no data, retried before anything else
/// on the next run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MisfireQueue {
    regions: BTreeSet<u32>,
}

impl MisfireQueue {
    /// Reads one region id per line. A missing file is an empty queue.
    pub fn load(path: &Path) -> io::Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e),
        };

        let mut regions = BTreeSet::new();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match line.parse() {
                Ok(id) => {
                    regions.insert(id);
                }
                Err(_) => warn!("Skipping malformed misfire entry {:?}", line),
            }
        }
        Ok(Self { regions })
    }

    /// Overwrites the file; an empty queue leaves an empty file.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let body: String = self.regions.iter().map(|id| format!("{}\n", id)).collect();
        fs::write(path, body)?;
        info!("Saved {} misfired regions to {}", self.regions.len(), path.display());
        Ok(())
    }

    pub fn push(&mut self, region: u32) {
        self.regions.insert(region);
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.regions.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        let queue = MisfireQueue::load(&dir.path().join("nope.txt")).unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn saves_and_reloads_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("misfired.txt");

        let mut queue = MisfireQueue::default();
        queue.push(14);
        queue.push(3);
        queue.save(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "3\n14\n");
        assert_eq!(MisfireQueue::load(&path).unwrap(), queue);

        MisfireQueue::default().save(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
        assert!(MisfireQueue::load(&path).unwrap().is_empty());
    }

    #[test]
    fn skips_blank_and_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("misfired.txt");
        fs::write(&path, "5\n\n  7 \nabc\n").unwrap();
        assert_eq!(MisfireQueue::load(&path).unwrap().ids(), vec![5, 7]);
    }
}
