//! Frequencies and named pitches on a 12-tone equal-tempered table

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::context::RateContext;
use crate::error::{QuaverError, Result};

/// Reference frequency for A4
pub const A4_FREQ: f64 = 440.0;

/// Two pitches closer than this (in Hz) compare equal
pub const PITCH_EPSILON_HZ: f64 = 0.01;

/// Highest octave in the note table
pub const MAX_OCTAVE: u8 = 10;

/// Largest cents offset accepted on a named pitch
pub const MAX_CENTS: f64 = 1200.0;

const MEASURED_OCTAVES: usize = 9;
const TABLE_OCTAVES: usize = MAX_OCTAVE as usize + 1;

/// Chromatic index of A4 counted from C0
const A4_INDEX: i32 = 57;

/// Note frequencies indexed `[octave][pitch class]`. Octaves 9 and 10 are
/// octave 8 doubled and quadrupled.
static NOTE_TABLE: LazyLock<[[f64; 12]; TABLE_OCTAVES]> = LazyLock::new(|| {
    let mut table = [[0.0; 12]; TABLE_OCTAVES];
    for octave in 0..MEASURED_OCTAVES {
        for class in 0..12 {
            let index = (octave * 12 + class) as i32;
            table[octave][class] = A4_FREQ * 2f64.powf((index - A4_INDEX) as f64 / 12.0);
        }
    }
    for class in 0..12 {
        table[9][class] = table[8][class] * 2.0;
        table[10][class] = table[8][class] * 4.0;
    }
    table
});

static NOTE_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-gA-G])([#b]?)(10|[0-9])(?:([+-]\d+(?:\.\d+)?)c)?$")
        .expect("note pattern is valid")
});

static FREQ_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+\.?\d*|\.\d+)\s*(?:hz)?$").expect("frequency pattern is valid")
});

/// One of the 12 chromatic pitch classes, spelled with sharps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    #[serde(rename = "C#")]
    CSharp,
    D,
    #[serde(rename = "D#")]
    DSharp,
    E,
    F,
    #[serde(rename = "F#")]
    FSharp,
    G,
    #[serde(rename = "G#")]
    GSharp,
    A,
    #[serde(rename = "A#")]
    ASharp,
    B,
}

impl PitchClass {
    const ALL: [PitchClass; 12] = [
        Self::C,
        Self::CSharp,
        Self::D,
        Self::DSharp,
        Self::E,
        Self::F,
        Self::FSharp,
        Self::G,
        Self::GSharp,
        Self::A,
        Self::ASharp,
        Self::B,
    ];

    /// Semitones above C
    pub fn index(&self) -> u8 {
        *self as u8
    }

    pub fn from_index(index: u8) -> Self {
        Self::ALL[(index % 12) as usize]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::C => "C",
            Self::CSharp => "C#",
            Self::D => "D",
            Self::DSharp => "D#",
            Self::E => "E",
            Self::F => "F",
            Self::FSharp => "F#",
            Self::G => "G",
            Self::GSharp => "G#",
            Self::A => "A",
            Self::ASharp => "A#",
            Self::B => "B",
        }
    }

    fn letter_offset(letter: char) -> Option<i32> {
        match letter.to_ascii_uppercase() {
            'C' => Some(0),
            'D' => Some(2),
            'E' => Some(4),
            'F' => Some(5),
            'G' => Some(7),
            'A' => Some(9),
            'B' => Some(11),
            _ => None,
        }
    }
}

fn table_freq(class: PitchClass, octave: u8) -> f64 {
    NOTE_TABLE[octave as usize][class.index() as usize]
}

/// Split a chromatic index into (class, octave) if it is on the table
fn split_index(index: i32) -> Option<(PitchClass, u8)> {
    if !(0..TABLE_OCTAVES as i32 * 12).contains(&index) {
        return None;
    }
    Some((PitchClass::from_index((index % 12) as u8), (index / 12) as u8))
}

/// Table entry nearest to `hz` by absolute distance; ties keep the lower entry
fn nearest_entry(hz: f64) -> (PitchClass, u8) {
    let mut best = (PitchClass::C, 0);
    let mut best_distance = f64::INFINITY;
    for octave in 0..TABLE_OCTAVES {
        for class in PitchClass::ALL {
            let distance = (NOTE_TABLE[octave][class.index() as usize] - hz).abs();
            if distance < best_distance {
                best_distance = distance;
                best = (class, octave as u8);
            }
        }
    }
    best
}

fn check_cents(cents: f64) -> Result<f64> {
    if !cents.is_finite() || cents.abs() > MAX_CENTS {
        return Err(QuaverError::value("cents", format!("|{cents}| exceeds {MAX_CENTS}")));
    }
    Ok(cents)
}

/// An immutable pitch, either a raw frequency or a named note
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "RawPitch", into = "RawPitch")]
pub enum PitchValue {
    Freq { hz: f64 },
    Note { class: PitchClass, octave: u8, cents: f64 },
}

/// Serialized form, checked on the way in
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "repr", rename_all = "lowercase")]
enum RawPitch {
    Freq { hz: f64 },
    Note { class: PitchClass, octave: u8, cents: f64 },
}

impl TryFrom<RawPitch> for PitchValue {
    type Error = QuaverError;

    fn try_from(raw: RawPitch) -> Result<Self> {
        match raw {
            RawPitch::Freq { hz } => Self::freq(hz),
            RawPitch::Note { class, octave, cents } => Self::note(class, octave, cents),
        }
    }
}

impl From<PitchValue> for RawPitch {
    fn from(pitch: PitchValue) -> Self {
        match pitch {
            PitchValue::Freq { hz } => Self::Freq { hz },
            PitchValue::Note { class, octave, cents } => Self::Note { class, octave, cents },
        }
    }
}

impl PitchValue {
    pub fn freq(hz: f64) -> Result<Self> {
        if !(hz.is_finite() && hz > 0.0) {
            return Err(QuaverError::value("frequency", format!("must be > 0 Hz, got {hz}")));
        }
        Ok(Self::Freq { hz })
    }

    pub fn note(class: PitchClass, octave: u8, cents: f64) -> Result<Self> {
        if octave > MAX_OCTAVE {
            let bound = format!("must be 0..={MAX_OCTAVE}, got {octave}");
            return Err(QuaverError::value("octave", bound));
        }
        Ok(Self::Note { class, octave, cents: check_cents(cents)? })
    }

    /// Parse `440`, `440hz`, `A4`, `c#5`, `Bb3`, `E4-12.5c`
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if let Some(caps) = NOTE_LITERAL.captures(trimmed) {
            let letter = caps[1].chars().next().unwrap_or('C');
            let offset = PitchClass::letter_offset(letter).ok_or_else(|| {
                QuaverError::parse(text, format!("unknown note letter '{letter}'"))
            })?;
            let accidental = match &caps[2] {
                "#" => 1,
                "b" => -1,
                _ => 0,
            };
            let octave: i32 = caps[3]
                .parse()
                .map_err(|_| QuaverError::parse(text, "invalid octave"))?;
            let cents = match caps.get(4) {
                Some(m) => {
                    let cents: f64 = m.as_str().parse().map_err(|_| {
                        QuaverError::parse(text, format!("invalid cents '{}'", m.as_str()))
                    })?;
                    check_cents(cents).map_err(|e| QuaverError::parse(text, e.to_string()))?
                }
                None => 0.0,
            };
            let (class, octave) =
                split_index(octave * 12 + offset + accidental).ok_or_else(|| {
                    QuaverError::parse(text, format!("octave outside 0..={MAX_OCTAVE}"))
                })?;
            return Ok(Self::Note { class, octave, cents });
        }

        let lowered = trimmed.to_ascii_lowercase();
        if let Some(caps) = FREQ_LITERAL.captures(&lowered) {
            let hz: f64 = caps[1]
                .parse()
                .map_err(|_| QuaverError::parse(text, "invalid frequency"))?;
            if hz <= 0.0 {
                return Err(QuaverError::parse(text, "frequency must be greater than 0"));
            }
            return Ok(Self::Freq { hz });
        }

        Err(QuaverError::parse(text, "expected a frequency in Hz or a note like A4"))
    }

    /// Frequency in Hz
    pub fn hz(&self) -> f64 {
        match *self {
            Self::Freq { hz } => hz,
            Self::Note { class, octave, cents } => {
                table_freq(class, octave) * 2f64.powf(cents / 1200.0)
            }
        }
    }

    pub fn is_note(&self) -> bool {
        matches!(self, Self::Note { .. })
    }

    /// Semitones above C0, including any cents offset
    pub fn chromatic_position(&self) -> f64 {
        let (class, octave, cents) = self.note_parts();
        (octave as i32 * 12 + class.index() as i32) as f64 + cents / 100.0
    }

    pub fn to_freq(&self) -> Self {
        Self::Freq { hz: self.hz() }
    }

    /// Nearest tabled note with the remainder kept as cents
    pub fn to_note(&self) -> Self {
        let (class, octave, cents) = self.note_parts();
        Self::Note { class, octave, cents }
    }

    fn note_parts(&self) -> (PitchClass, u8, f64) {
        match *self {
            Self::Note { class, octave, cents } => (class, octave, cents),
            Self::Freq { hz } => {
                let (class, octave) = nearest_entry(hz);
                (class, octave, 1200.0 * (hz / table_freq(class, octave)).log2())
            }
        }
    }

    /// Nearest tabled note, discarding the cents remainder (lossy)
    pub fn to_whole_note(&self) -> Self {
        let (class, octave) = nearest_entry(self.hz());
        Self::Note { class, octave, cents: 0.0 }
    }

    /// A frequency is scaled by `2^(n/12)`. A note stays a note; cents
    /// accumulate and are kept within (-50, 50].
    pub fn shift_semitones(&self, semitones: f64) -> Result<Self> {
        if !semitones.is_finite() {
            return Err(QuaverError::value("semitone shift", "must be finite"));
        }
        match *self {
            Self::Freq { hz } => Self::freq(hz * 2f64.powf(semitones / 12.0)),
            Self::Note { class, octave, cents } => {
                let total_cents = cents + semitones * 100.0;
                let steps = ((total_cents - 50.0) / 100.0).ceil();
                let remainder = total_cents - steps * 100.0;
                let index = (octave as i32 * 12 + class.index() as i32) as f64 + steps;
                let on_table = (0.0..(TABLE_OCTAVES * 12) as f64).contains(&index);
                let (class, octave) = on_table
                    .then(|| split_index(index as i32))
                    .flatten()
                    .ok_or_else(|| {
                        let bound = format!(
                            "shift by {semitones} semitones leaves octaves 0..={MAX_OCTAVE}"
                        );
                        QuaverError::value("pitch", bound)
                    })?;
                Ok(Self::Note { class, octave, cents: remainder })
            }
        }
    }

    pub fn shift_octaves(&self, octaves: i32) -> Result<Self> {
        self.shift_semitones(12.0 * octaves as f64)
    }

    /// Samples in one cycle at this pitch
    pub fn get_period(&self, rate: &RateContext) -> f64 {
        rate.get_rate() / self.hz()
    }
}

impl PartialEq for PitchValue {
    fn eq(&self, other: &Self) -> bool {
        (self.hz() - other.hz()).abs() <= PITCH_EPSILON_HZ
    }
}

impl fmt::Display for PitchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Freq { hz } => write!(f, "{hz}Hz"),
            Self::Note { class, octave, cents } if cents == 0.0 => {
                write!(f, "{}{octave}", class.name())
            }
            Self::Note { class, octave, cents } => write!(f, "{}{octave}{cents:+}c", class.name()),
        }
    }
}
