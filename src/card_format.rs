use encoding_rs::{Encoding, SHIFT_JIS, UTF_8};
use serde::Serialize;

use crate::error::{KakeiboError, Result};

// ---------------------------------------------------------------------------
// Card types: a closed set resolved through a lookup table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    Rakuten,
    Smbc,
    SonyDebit,
}

impl CardType {
    pub fn key(&self) -> &'static str {
        self.spec().key
    }

    pub fn name(&self) -> &'static str {
        self.spec().name
    }

    pub fn from_key(key: &str) -> Result<Self> {
        CARD_FORMATS
            .iter()
            .find(|spec| spec.key == key.trim())
            .map(|spec| spec.card_type)
            .ok_or_else(|| KakeiboError::UnknownCardType(key.to_string()))
    }

    pub fn spec(&self) -> &'static CardFormatSpec {
        CARD_FORMATS
            .iter()
            .find(|spec| spec.card_type == *self)
            .unwrap_or(&CARD_FORMATS[0])
    }

    pub fn all() -> impl Iterator<Item = CardType> {
        CARD_FORMATS.iter().map(|spec| spec.card_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// UTF-8, with or without a byte-order mark.
    Utf8,
    ShiftJis,
}

impl TextEncoding {
    pub fn encoding(&self) -> &'static Encoding {
        match self {
            Self::Utf8 => UTF_8,
            Self::ShiftJis => SHIFT_JIS,
        }
    }
}

/// How the statement records a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignRule {
    DebitPositive,
    DebitNegative,
}

/// Rows before the first data row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leading {
    /// A header row whose cell at each listed column must carry the given label.
    Header(&'static [(usize, &'static str)]),
    /// A fixed number of preamble rows with no header.
    Skip(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trailing {
    None,
    /// The first row with an empty date cell starts the summary. Every row
    /// after it must also have an empty date.
    BlankDate,
}

#[derive(Debug)]
pub struct CardFormatSpec {
    pub card_type: CardType,
    pub key: &'static str,
    pub name: &'static str,
    pub encoding: TextEncoding,
    pub delimiter: u8,
    pub leading: Leading,
    pub trailing: Trailing,
    pub date_col: usize,
    pub description_col: usize,
    pub amount_col: usize,
    pub date_format: &'static str,
    pub sign: SignRule,
    /// Digits after the decimal point in the minor unit (yen have none).
    pub minor_digits: u32,
}

impl CardFormatSpec {
    pub fn min_columns(&self) -> usize {
        self.date_col.max(self.description_col).max(self.amount_col) + 1
    }
}

pub const CARD_FORMATS: &[CardFormatSpec] = &[
    CardFormatSpec {
        card_type: CardType::Rakuten,
        key: "rakuten",
        name: "Rakuten Card",
        encoding: TextEncoding::Utf8,
        delimiter: b',',
        leading: Leading::Header(&[(0, "利用日"), (1, "利用店名・商品名"), (4, "利用金額")]),
        trailing: Trailing::None,
        date_col: 0,
        description_col: 1,
        amount_col: 4,
        date_format: "%Y/%m/%d",
        sign: SignRule::DebitPositive,
        minor_digits: 0,
    },
    CardFormatSpec {
        card_type: CardType::Smbc,
        key: "smbc",
        name: "SMBC Card",
        encoding: TextEncoding::ShiftJis,
        delimiter: b',',
        leading: Leading::Skip(1),
        trailing: Trailing::BlankDate,
        date_col: 0,
        description_col: 1,
        amount_col: 2,
        date_format: "%Y/%m/%d",
        sign: SignRule::DebitPositive,
        minor_digits: 0,
    },
    CardFormatSpec {
        card_type: CardType::SonyDebit,
        key: "sony_debit",
        name: "Sony Bank WALLET",
        encoding: TextEncoding::ShiftJis,
        delimiter: b',',
        leading: Leading::Header(&[(0, "利用日"), (1, "利用内容"), (2, "金額")]),
        trailing: Trailing::None,
        date_col: 0,
        description_col: 1,
        amount_col: 2,
        date_format: "%Y年%m月%d日",
        sign: SignRule::DebitNegative,
        minor_digits: 0,
    },
];
