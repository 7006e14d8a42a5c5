//! Fehlertypen fuer den Authentifizierungskern
//!
//! Der Kern signalisiert nur Fehlerarten; die Abbildung auf Transport-
//! Antworten und Benutzertexte uebernimmt die aufrufende Schicht.

use thiserror::Error;

use crate::token::TokenFehler;

/// Alle moeglichen Fehler im Authentifizierungskern
#[derive(Debug, Error)]
pub enum AuthError {
    // --- Registrierung ---
    #[error("E-Mail bereits registriert: {0}")]
    EmailVergeben(String),

    // --- Authentifizierung ---
    // Bewusst identisch fuer "unbekannte E-Mail" und "falsches Passwort".
    #[error("E-Mail oder Passwort falsch")]
    UngueltigeAnmeldedaten,

    #[error("Benutzer nicht verifiziert")]
    NichtVerifiziert,

    #[error("Benutzer gesperrt")]
    BenutzerGesperrt,

    // --- Tokens ---
    #[error(transparent)]
    Token(#[from] TokenFehler),

    // --- Autorisierung ---
    // "nicht angemeldet" und "angemeldet, aber Rolle fehlt" duerfen
    // nie vermengt werden.
    #[error("Anmeldung erforderlich")]
    AnmeldungErforderlich,

    #[error("Zugriff verweigert: Rolle fehlt ({0})")]
    ZugriffVerweigert(String),

    // --- Workflow-Haken ---
    #[error("Workflow durch Haken abgebrochen: {0}")]
    HookAbgebrochen(String),

    // --- Passwort ---
    #[error("Passwort-Hashing fehlgeschlagen: {0}")]
    PasswortHashing(String),

    // --- Verwaltung ---
    #[error("Benutzer nicht gefunden: {0}")]
    BenutzerNichtGefunden(String),

    #[error("Rolle nicht gefunden: {0}")]
    RolleNichtGefunden(String),

    // --- Konfiguration ---
    #[error("Ungueltige Konfiguration: {0}")]
    Konfiguration(String),

    // --- Persistenz ---
    #[error("Datenbankfehler: {0}")]
    Datenbank(#[from] gatehouse_db::DbError),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl AuthError {
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    pub fn hook_abgebrochen(msg: impl Into<String>) -> Self {
        Self::HookAbgebrochen(msg.into())
    }
}

/// Result-Alias fuer den Authentifizierungskern
pub type AuthResult<T> = Result<T, AuthError>;
