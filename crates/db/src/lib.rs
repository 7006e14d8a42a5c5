//! gatehouse-db – Repository-Abstraktion
//!
//! Dieses Crate stellt das Repository-Pattern bereit, das die
//! Authentifizierungslogik von der konkreten Speichertechnologie entkoppelt.
//! Es definiert nur Datensaetze und Traits; die konkrete Implementierung
//! (SQL, Key-Value, In-Memory) liefert der Einbettende. Transaktions- und
//! Eindeutigkeitsgarantien liegen bei dieser Implementierung.

pub mod error;
pub mod models;
pub mod repository;

// Bequeme Re-Exporte
pub use error::{DbError, DbResult};
pub use models::{
    BenutzerRecord, BenutzerUpdate, NeueRolle, NeuerBenutzer, RolleRecord, RollenUpdate,
};
pub use repository::{RoleRepository, UserRepository};
