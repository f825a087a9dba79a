//! Card model and tab-separated input parsing

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One phrase/translation pair to be turned into a flashcard
///
/// Immutable after parsing. `index` is 1-based and stable: it drives the
/// generated media filenames and the row order of the exported deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    pub index: usize,
    pub phrase: String,
    pub translation: String,
}

impl Card {
    pub fn new(index: usize, phrase: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            index,
            phrase: phrase.into(),
            translation: translation.into(),
        }
    }
}

/// Kind of generated asset attached to a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Audio,
    Mnemonic,
}

impl AssetKind {
    /// Filename segment: `<runId>_<index>_<segment>.<ext>`
    pub fn file_segment(&self) -> &'static str {
        match self {
            AssetKind::Image => "img",
            AssetKind::Audio => "audio",
            AssetKind::Mnemonic => "mnemonic",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AssetKind::Image => "image",
            AssetKind::Audio => "audio",
            AssetKind::Mnemonic => "mnemonic",
        };
        f.write_str(label)
    }
}

/// Parse `phrase<TAB>translation` lines into cards
///
/// - Extra columns are ignored
/// - Lines with fewer than two columns, or an empty phrase, are skipped
/// - Fields are trimmed; `\r\n` line endings are accepted
/// - Indices are assigned 1.. over the accepted lines only
pub fn parse_cards(input: &str) -> Vec<Card> {
    let mut cards = Vec::new();

    for line in input.lines() {
        let mut columns = line.split('\t');
        let (Some(phrase), Some(translation)) = (columns.next(), columns.next()) else {
            continue;
        };

        let phrase = phrase.trim();
        if phrase.is_empty() {
            continue;
        }

        cards.push(Card::new(cards.len() + 1, phrase, translation.trim()));
    }

    cards
}
