//! Legends of Runeterra deck codes.
//!
//! A deck code is an unpadded RFC 4648 base32 string wrapping a small binary
//! payload: one header byte (format in the high nibble, version in the low
//! nibble) followed by unsigned LEB128 varints. Cards held at three, two and
//! one copies are grouped by `(set, faction)`; cards with more copies follow
//! as flat `(count, set, faction, number)` entries.
//!
//! Parsing always re-encodes the deck canonically, so two codes describing
//! the same cards normalise to the same `deckcode`.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
const FORMAT: u8 = 1;
const MAX_VERSION: u8 = 5;
const MAX_ENTRIES: u64 = 512;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeckcodeError {
    #[error("deck code is not valid base32")]
    Encoding,
    #[error("deck code is empty")]
    Empty,
    #[error("unsupported deck code format {0}")]
    UnsupportedFormat(u8),
    #[error("unsupported deck code version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown faction id {0}")]
    UnknownFaction(u64),
    #[error("malformed deck code: {0}")]
    Malformed(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Faction {
    Demacia,
    Freljord,
    Ionia,
    Noxus,
    PiltoverZaun,
    ShadowIsles,
    Bilgewater,
    Shurima,
    MountTargon,
    BandleCity,
    Runeterra,
}

impl Faction {
    pub const ALL: [Faction; 11] = [
        Faction::Demacia,
        Faction::Freljord,
        Faction::Ionia,
        Faction::Noxus,
        Faction::PiltoverZaun,
        Faction::ShadowIsles,
        Faction::Bilgewater,
        Faction::Shurima,
        Faction::MountTargon,
        Faction::BandleCity,
        Faction::Runeterra,
    ];

    pub fn id(self) -> u64 {
        match self {
            Faction::Demacia => 0,
            Faction::Freljord => 1,
            Faction::Ionia => 2,
            Faction::Noxus => 3,
            Faction::PiltoverZaun => 4,
            Faction::ShadowIsles => 5,
            Faction::Bilgewater => 6,
            Faction::Shurima => 7,
            Faction::MountTargon => 9,
            Faction::BandleCity => 10,
            Faction::Runeterra => 12,
        }
    }

    pub fn from_id(id: u64) -> Result<Self, DeckcodeError> {
        Self::ALL
            .into_iter()
            .find(|faction| faction.id() == id)
            .ok_or(DeckcodeError::UnknownFaction(id))
    }

    pub fn code(self) -> &'static str {
        match self {
            Faction::Demacia => "DE",
            Faction::Freljord => "FR",
            Faction::Ionia => "IO",
            Faction::Noxus => "NX",
            Faction::PiltoverZaun => "PZ",
            Faction::ShadowIsles => "SI",
            Faction::Bilgewater => "BW",
            Faction::Shurima => "SH",
            Faction::MountTargon => "MT",
            Faction::BandleCity => "BC",
            Faction::Runeterra => "RU",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|faction| faction.code().eq_ignore_ascii_case(code.trim()))
    }

    /// Oldest payload version able to carry this faction.
    fn min_version(self) -> u8 {
        match self {
            Faction::Demacia
            | Faction::Freljord
            | Faction::Ionia
            | Faction::Noxus
            | Faction::PiltoverZaun
            | Faction::ShadowIsles => 1,
            Faction::Bilgewater | Faction::MountTargon => 2,
            Faction::Shurima => 3,
            Faction::BandleCity => 4,
            Faction::Runeterra => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Card {
    pub set: u64,
    pub faction: Faction,
    pub number: u64,
}

impl Card {
    pub fn new(set: u64, faction: Faction, number: u64) -> Self {
        Self {
            set,
            faction,
            number,
        }
    }

    pub fn code(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}{}{:03}", self.set, self.faction.code(), self.number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardEntry {
    pub card: Card,
    pub count: u64,
}

/// Result of a successful parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDeck {
    /// Canonical re-encoding of the input.
    pub deckcode: String,
    /// Entries ordered by card code.
    pub cards: Vec<CardEntry>,
    pub total_count: u64,
    /// Distinct factions, in [`Faction`] order.
    pub factions: Vec<Faction>,
}

impl ParsedDeck {
    pub fn faction_codes(&self) -> Vec<String> {
        self.factions
            .iter()
            .map(|faction| faction.code().to_string())
            .collect()
    }
}

/// Deck-code validation seam used by the application layer.
pub trait DeckcodeParser: Send + Sync {
    fn parse(&self, raw: &str) -> Result<ParsedDeck, DeckcodeError>;

    fn validate(&self, raw: &str) -> bool {
        self.parse(raw).is_ok()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RuneterraDeckcodes;

impl DeckcodeParser for RuneterraDeckcodes {
    fn parse(&self, raw: &str) -> Result<ParsedDeck, DeckcodeError> {
        parse_deckcode(raw)
    }
}

pub fn parse_deckcode(raw: &str) -> Result<ParsedDeck, DeckcodeError> {
    let bytes = base32_decode(raw.trim()).ok_or(DeckcodeError::Encoding)?;
    let (&header, payload) = bytes.split_first().ok_or(DeckcodeError::Empty)?;

    let format = header >> 4;
    let version = header & 0x0f;
    if format != FORMAT {
        return Err(DeckcodeError::UnsupportedFormat(format));
    }
    if version == 0 || version > MAX_VERSION {
        return Err(DeckcodeError::UnsupportedVersion(version));
    }

    let mut reader = VarintReader::new(payload);
    let mut counts: BTreeMap<String, CardEntry> = BTreeMap::new();
    let mut push = |card: Card, count: u64| {
        counts
            .entry(card.code())
            .and_modify(|entry| entry.count += count)
            .or_insert(CardEntry { card, count });
    };

    for copies in [3, 2, 1] {
        let groups = reader.bounded()?;
        for _ in 0..groups {
            let cards = reader.bounded()?;
            let set = reader.next()?;
            let faction = Faction::from_id(reader.next()?)?;
            for _ in 0..cards {
                push(Card::new(set, faction, reader.next()?), copies);
            }
        }
    }

    while !reader.is_empty() {
        let count = reader.bounded()?;
        if count == 0 {
            return Err(DeckcodeError::Malformed("card entry with zero copies"));
        }
        let set = reader.next()?;
        let faction = Faction::from_id(reader.next()?)?;
        push(Card::new(set, faction, reader.next()?), count);
    }

    let cards: Vec<CardEntry> = counts.into_values().collect();
    if cards.is_empty() {
        return Err(DeckcodeError::Empty);
    }

    let total_count = cards.iter().map(|entry| entry.count).sum();
    let mut factions: Vec<Faction> = cards.iter().map(|entry| entry.card.faction).collect();
    factions.sort();
    factions.dedup();

    Ok(ParsedDeck {
        deckcode: encode_deck(&cards),
        cards,
        total_count,
        factions,
    })
}

/// Canonically encode a list of card entries.
///
/// Groups are ordered by size, then by the code of their first card; cards
/// inside a group are ordered by code. The header carries the lowest version
/// that can represent every faction in the deck.
pub fn encode_deck(entries: &[CardEntry]) -> String {
    let version = entries
        .iter()
        .map(|entry| entry.card.faction.min_version())
        .max()
        .unwrap_or(1);

    let mut out = vec![(FORMAT << 4) | version];

    for copies in [3, 2, 1] {
        let mut grouped: BTreeMap<(u64, u64), Vec<Card>> = BTreeMap::new();
        for entry in entries.iter().filter(|entry| entry.count == copies) {
            grouped
                .entry((entry.card.set, entry.card.faction.id()))
                .or_default()
                .push(entry.card);
        }

        let mut groups: Vec<Vec<Card>> = grouped.into_values().collect();
        for group in &mut groups {
            group.sort_by_key(Card::code);
        }
        groups.sort_by(|a, b| {
            a.len()
                .cmp(&b.len())
                .then_with(|| a[0].code().cmp(&b[0].code()))
        });

        write_varint(&mut out, groups.len() as u64);
        for group in &groups {
            write_varint(&mut out, group.len() as u64);
            write_varint(&mut out, group[0].set);
            write_varint(&mut out, group[0].faction.id());
            for card in group {
                write_varint(&mut out, card.number);
            }
        }
    }

    let mut extra: Vec<&CardEntry> = entries.iter().filter(|entry| entry.count > 3).collect();
    extra.sort_by_key(|entry| entry.card.code());
    for entry in extra {
        write_varint(&mut out, entry.count);
        write_varint(&mut out, entry.card.set);
        write_varint(&mut out, entry.card.faction.id());
        write_varint(&mut out, entry.card.number);
    }

    base32_encode(&out)
}

struct VarintReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> VarintReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    fn is_empty(&self) -> bool {
        self.position >= self.bytes.len()
    }

    fn next(&mut self) -> Result<u64, DeckcodeError> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = *self
                .bytes
                .get(self.position)
                .ok_or(DeckcodeError::Malformed("truncated varint"))?;
            self.position += 1;
            if shift >= 64 {
                return Err(DeckcodeError::Malformed("varint overflow"));
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// Read a count that drives a loop; rejects absurd values early.
    fn bounded(&mut self) -> Result<u64, DeckcodeError> {
        let value = self.next()?;
        if value > MAX_ENTRIES {
            return Err(DeckcodeError::Malformed("count out of range"));
        }
        Ok(value)
    }
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn base32_decode(input: &str) -> Option<Vec<u8>> {
    let trimmed = input.trim_end_matches('=');
    let mut out = Vec::with_capacity(trimmed.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for ch in trimmed.bytes() {
        let upper = ch.to_ascii_uppercase();
        let value = BASE32_ALPHABET.iter().position(|&c| c == upper)? as u32;
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((buffer >> bits) & 0xff) as u8);
        }
        buffer &= (1 << bits) - 1;
    }

    Some(out)
}

fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;

    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 31) as usize] as char);
        }
        buffer &= (1 << bits) - 1;
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 31) as usize] as char);
    }

    out
}
