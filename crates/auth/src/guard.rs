//! Rollen-Guards
//!
//! Reine, totale Entscheidungsfunktionen ueber Rollennamen (exakter,
//! case-sensitiver Vergleich). Die Kontext-Varianten unterscheiden strikt
//! zwischen fehlender Anmeldung und fehlender Rolle: "nicht angemeldet"
//! ist ein Authentifizierungsfehler, "angemeldet aber Rolle fehlt" ein
//! Autorisierungsfehler.

use crate::backend::AuthKontext;
use crate::error::{AuthError, AuthResult};

/// Erlaubt wenn mindestens eine der erforderlichen Rollen zugewiesen ist
///
/// Eine leere Anforderungsmenge erlaubt alles.
pub fn rollen_akzeptiert<R, Z>(erforderlich: &[R], zugewiesen: &[Z]) -> bool
where
    R: AsRef<str>,
    Z: AsRef<str>,
{
    erforderlich.is_empty()
        || erforderlich
            .iter()
            .any(|r| zugewiesen.iter().any(|z| z.as_ref() == r.as_ref()))
}

/// Erlaubt nur wenn jede erforderliche Rolle zugewiesen ist
///
/// Eine leere Anforderungsmenge erlaubt alles.
pub fn rollen_erforderlich<R, Z>(erforderlich: &[R], zugewiesen: &[Z]) -> bool
where
    R: AsRef<str>,
    Z: AsRef<str>,
{
    erforderlich
        .iter()
        .all(|r| zugewiesen.iter().any(|z| z.as_ref() == r.as_ref()))
}

/// Guard-Praedikat: mindestens eine erforderliche Rolle
pub fn kontext_akzeptiert(kontext: &AuthKontext, erforderlich: &[&str]) -> AuthResult<()> {
    match kontext {
        AuthKontext::Anonym => Err(AuthError::AnmeldungErforderlich),
        AuthKontext::Angemeldet { rollen, .. } => {
            if rollen_akzeptiert(erforderlich, rollen) {
                Ok(())
            } else {
                Err(AuthError::ZugriffVerweigert(erforderlich.join(", ")))
            }
        }
    }
}

/// Guard-Praedikat: alle erforderlichen Rollen
pub fn kontext_erforderlich(kontext: &AuthKontext, erforderlich: &[&str]) -> AuthResult<()> {
    match kontext {
        AuthKontext::Anonym => Err(AuthError::AnmeldungErforderlich),
        AuthKontext::Angemeldet { rollen, .. } => {
            if rollen_erforderlich(erforderlich, rollen) {
                Ok(())
            } else {
                Err(AuthError::ZugriffVerweigert(erforderlich.join(", ")))
            }
        }
    }
}
