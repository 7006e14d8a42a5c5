//! Vertrauenswuerdige Zeitquelle
//!
//! Alle Ablaufvergleiche im Kern laufen ueber eine einzige injizierte
//! Zeitquelle, damit Tests die Uhr kontrollieren koennen.

use chrono::{DateTime, Utc};

/// Zeitquelle fuer Ablaufvergleiche
pub trait Zeitquelle: Send + Sync {
    /// Gibt die aktuelle Zeit zurueck
    fn jetzt(&self) -> DateTime<Utc>;
}

/// Standard-Zeitquelle: Systemuhr
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemZeit;

impl Zeitquelle for SystemZeit {
    fn jetzt(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
