//! Russian presentation of heating dates.

use chrono::{Datelike, NaiveDate};

use super::season::{HeatingSwitch, Season};

const MONTHS: [&str; 12] = [
    "января", "февраля", "марта", "апреля", "мая", "июня",
    "июля", "августа", "сентября", "октября", "ноября", "декабря",
];

const MONTHS_SHORT: [&str; 12] = [
    "янв", "фев", "мар", "апр", "мая", "июн",
    "июл", "авг", "сент", "окт", "нояб", "дек",
];

/// `2024-06-01` -> `1 июня`, or `1 июн` for graph labels.
pub fn display_date(date: NaiveDate, short: bool) -> String {
    let months = if short { &MONTHS_SHORT } else { &MONTHS };
    format!("{} {}", date.day(), months[date.month0() as usize])
}

// "во Владивостоке", "во Владимире", but "в Москве"
fn preposition(place: &str) -> &'static str {
    if place.starts_with("Влад") {
        "во"
    } else {
        "в"
    }
}

pub fn page_title(place: &str) -> String {
    format!("Отопление {} {}", preposition(place), place)
}

/// Sentence shown for a region: when the heating switches, or that it will
/// not switch soon when no date is known.
pub fn heating_message(place: &str, heating_date: Option<&str>, season: Season) -> String {
    let verb = match season.direction() {
        HeatingSwitch::Off => "отключат",
        HeatingSwitch::On => "включат",
    };
    match heating_date {
        Some(date) => format!("{} {} {}.*", page_title(place), verb, date),
        None => format!("{} в ближайшее время не {}.*", page_title(place), verb),
    }
}
