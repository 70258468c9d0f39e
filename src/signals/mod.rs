pub mod aggregator;
pub mod detector;
pub mod display;
pub mod season;

pub use aggregator::{aggregate, BlendedSeries};
pub use detector::detect;
pub use season::Season;
