//! Pet identity and the self-expiring speech bubble.

use crate::error::PetError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// How long a message stays in the bubble.
pub const MESSAGE_TTL: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PetType {
    Cat,
    Dog,
    Rabbit,
    Hamster,
}

impl PetType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cat => "cat",
            Self::Dog => "dog",
            Self::Rabbit => "rabbit",
            Self::Hamster => "hamster",
        }
    }
}

impl fmt::Display for PetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PetType {
    type Err = PetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cat" => Ok(Self::Cat),
            "dog" => Ok(Self::Dog),
            "rabbit" => Ok(Self::Rabbit),
            "hamster" => Ok(Self::Hamster),
            other => Err(PetError::InvalidArgument(format!("unknown pet type '{other}'"))),
        }
    }
}

/// Presentation-only flavour of the pet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Personality {
    Cold,
    Clingy,
    Playful,
    Quiet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Happy,
    Sad,
    #[default]
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyBand {
    Critical,
    Low,
    Normal,
}

/// Pet record as served by `GET /pet`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetRecord {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub pet_type: PetType,
    pub personality: Personality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    #[serde(default, rename = "currentMessage")]
    pub current_message: String,
}

/// The live pet. Written only by the interaction side of the gateway.
#[derive(Debug, Clone)]
pub struct PetState {
    pub id: i64,
    pub name: String,
    pub pet_type: PetType,
    pub personality: Personality,
    pub energy: u8,
    pub mood: Mood,
    message: String,
    message_expires_at: Option<Instant>,
}

impl Default for PetState {
    fn default() -> Self {
        Self {
            id: 1,
            name: "Kitty".to_string(),
            pet_type: PetType::Cat,
            personality: Personality::Playful,
            energy: 100,
            mood: Mood::Neutral,
            message: String::new(),
            message_expires_at: None,
        }
    }
}

impl PetState {
    /// Refresh identity, energy and mood. The bubble is left alone.
    pub fn apply_record(&mut self, record: &PetRecord) {
        self.id = record.id;
        self.name.clone_from(&record.name);
        self.pet_type = record.pet_type;
        self.personality = record.personality;
        self.energy = clamp_energy(record.energy);
        self.mood = record.mood.unwrap_or_default();
    }

    /// Put `text` in the bubble until `now + MESSAGE_TTL`. Empty text clears it.
    pub fn show_message(&mut self, text: &str, now: Instant) {
        if text.trim().is_empty() {
            self.clear_message();
            return;
        }
        self.message = text.to_string();
        self.message_expires_at = Some(now + MESSAGE_TTL);
    }

    fn clear_message(&mut self) {
        self.message.clear();
        self.message_expires_at = None;
    }

    /// Bubble content as seen at `now`.
    pub fn message_at(&self, now: Instant) -> &str {
        match self.message_expires_at {
            Some(expiry) if now < expiry => &self.message,
            _ => "",
        }
    }

    /// Drop the bubble if its expiry has passed. Returns true when it was cleared.
    pub fn expire_message(&mut self, now: Instant) -> bool {
        match self.message_expires_at {
            Some(expiry) if now >= expiry => {
                self.clear_message();
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    fn message_expires_at(&self) -> Option<Instant> {
        self.message_expires_at
    }

    pub fn energy_band(&self) -> EnergyBand {
        match self.energy {
            0..=29 => EnergyBand::Critical,
            30..=59 => EnergyBand::Low,
            _ => EnergyBand::Normal,
        }
    }

    pub fn view(&self, now: Instant) -> PetView {
        PetView {
            id: self.id,
            name: self.name.clone(),
            pet_type: self.pet_type,
            personality: self.personality,
            energy: self.energy,
            energy_band: self.energy_band(),
            mood: self.mood,
            current_message: self.message_at(now).to_string(),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_energy(energy: Option<f64>) -> u8 {
    match energy {
        Some(e) if e.is_finite() => e.round().clamp(0.0, 100.0) as u8,
        _ => 100,
    }
}

/// Snapshot handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PetView {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub pet_type: PetType,
    pub personality: Personality,
    pub energy: u8,
    pub energy_band: EnergyBand,
    pub mood: Mood,
    pub current_message: String,
}
