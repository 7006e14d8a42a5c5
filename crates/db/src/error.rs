//! Fehlertypen fuer das Repository-Crate

use thiserror::Error;

/// Fehler die eine Repository-Implementierung melden kann
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Datensatz nicht gefunden: {0}")]
    NichtGefunden(String),

    #[error("Eindeutigkeitsverletzung: {0}")]
    Eindeutigkeit(String),

    #[error("Ungueltige Daten: {0}")]
    UngueltigeDaten(String),

    #[error("Interner Speicherfehler: {0}")]
    Intern(String),
}

impl DbError {
    pub fn nicht_gefunden(msg: impl Into<String>) -> Self {
        Self::NichtGefunden(msg.into())
    }

    pub fn eindeutigkeit(msg: impl Into<String>) -> Self {
        Self::Eindeutigkeit(msg.into())
    }

    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn es sich um einen Eindeutigkeitsfehler handelt
    ///
    /// Damit koennen Aufrufer gleichzeitige Registrierungen deterministisch
    /// aufloesen: genau ein Versuch gewinnt, der andere sieht diesen Fehler.
    pub fn ist_eindeutigkeit(&self) -> bool {
        matches!(self, Self::Eindeutigkeit(_))
    }
}

/// Result-Alias fuer Repository-Operationen
pub type DbResult<T> = Result<T, DbError>;
