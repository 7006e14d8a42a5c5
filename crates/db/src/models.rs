//! Datensaetze fuer Benutzer und Rollen
//!
//! Diese Typen repraesentieren die vom Repository verwalteten Datensaetze.
//! Der Kern haelt sie nur fuer die Dauer eines Workflow-Aufrufs; Eigentuemer
//! ist die Persistenzschicht.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Benutzer
// ---------------------------------------------------------------------------

/// Benutzer-Datensatz
///
/// `email` ist eindeutig und normalisiert gespeichert (getrimmt,
/// kleingeschrieben). `rollen` ist eine reine Mitgliedschaftsmenge ohne
/// eigene Identitaet; die Reihenfolge ist ohne Bedeutung.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenutzerRecord {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    /// Darf sich dieser Benutzer anmelden? (administrativ, reversibel)
    pub is_active: bool,
    /// Hat dieser Benutzer die Verifizierung abgeschlossen? (einmalig, monoton)
    pub is_verified: bool,
    pub rollen: Vec<RolleRecord>,
    pub created_at: DateTime<Utc>,
}

impl BenutzerRecord {
    /// Gibt die Namen der zugewiesenen Rollen zurueck
    pub fn rollen_namen(&self) -> Vec<String> {
        self.rollen.iter().map(|r| r.name.clone()).collect()
    }

    /// Prueft ob der Benutzer eine Rolle mit diesem Namen hat (exakter Vergleich)
    pub fn hat_rolle(&self, name: &str) -> bool {
        self.rollen.iter().any(|r| r.name == name)
    }
}

/// Daten zum Erstellen eines neuen Benutzers
#[derive(Debug, Clone)]
pub struct NeuerBenutzer<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub is_active: bool,
    pub is_verified: bool,
}

/// Daten zum Aktualisieren eines Benutzers
#[derive(Debug, Clone, Default)]
pub struct BenutzerUpdate {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
}

// ---------------------------------------------------------------------------
// Rollen
// ---------------------------------------------------------------------------

/// Rollen-Datensatz
///
/// Eine benannte Autorisierungs-Markierung. `name` ist eindeutig,
/// `beschreibung` ist Freitext. Many-to-many mit Benutzern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolleRecord {
    pub id: Uuid,
    pub name: String,
    pub beschreibung: Option<String>,
}

/// Daten zum Erstellen einer neuen Rolle
#[derive(Debug, Clone)]
pub struct NeueRolle<'a> {
    pub name: &'a str,
    pub beschreibung: Option<&'a str>,
}

/// Daten zum Aktualisieren einer Rolle
#[derive(Debug, Clone, Default)]
pub struct RollenUpdate {
    pub name: Option<String>,
    /// `Some(None)` loescht die Beschreibung
    pub beschreibung: Option<Option<String>>,
}
