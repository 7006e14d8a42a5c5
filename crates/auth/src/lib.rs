//! gatehouse-auth – Authentifizierungs- und Autorisierungskern
//!
//! Dieses Crate implementiert:
//! - Passwort-Hashing mit Argon2id inkl. Migration von Altbestands-Hashes
//! - Signierte, zweckgebundene Einmal-Tokens (Verifizierung, Passwort-Reset)
//! - AuthBackend (signierter Token oder serverseitige Session)
//! - Rollen-Guards (akzeptiert / erforderlich)
//! - UserAuthService (Registrierung, Anmeldung, Verifizierung,
//!   Passwort-Reset, Rollenverwaltung) mit Workflow-Haken
//!
//! HTTP-Routing, Persistenz und Token-Zustellung sind bewusst ausgelagert:
//! der Kern entscheidet nur, welcher Hash, Token oder Entscheid produziert
//! wird, nicht wie er transportiert wird.

pub mod backend;
pub mod config;
pub mod error;
pub mod guard;
pub mod password;
pub mod service;
pub mod session;
pub mod token;
pub mod zeit;

// Bequeme Re-Exporte
pub use backend::{AuthBackend, AuthKontext};
pub use config::{AuthConfig, BackendWahl, TokenTtl};
pub use error::{AuthError, AuthResult};
pub use guard::{kontext_akzeptiert, kontext_erforderlich, rollen_akzeptiert, rollen_erforderlich};
pub use password::{HashVerfahren, PasswordManager, PasswortPruefung};
pub use service::{email_normalisieren, AuthHaken, UserAuthService};
pub use session::{MemorySessionSpeicher, SessionEintrag, SessionSpeicher};
pub use token::{TokenCodec, TokenDaten, TokenFehler, TokenZweck};
pub use zeit::{SystemZeit, Zeitquelle};
