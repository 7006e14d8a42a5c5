//! Repository-Trait-Definitionen
//!
//! Das Repository-Pattern entkoppelt die Authentifizierungslogik von der
//! konkreten Speichertechnologie. Jede schreibende Operation muss von der
//! Implementierung innerhalb einer transaktionalen Grenze ausgefuehrt
//! werden; `create` muss die Eindeutigkeit der E-Mail-Adresse bzw. des
//! Rollennamens durchsetzen und Verletzungen als
//! [`DbError::Eindeutigkeit`](crate::DbError::Eindeutigkeit) melden.

use uuid::Uuid;

use crate::{
    error::DbResult,
    models::{BenutzerRecord, BenutzerUpdate, NeueRolle, NeuerBenutzer, RolleRecord, RollenUpdate},
};

/// Repository fuer Benutzer-Datenzugriffe
///
/// `add_role`/`remove_role` verwalten die Benutzer-Rollen-Relation als reine
/// Menge: doppeltes Hinzufuegen und Entfernen nicht vorhandener Eintraege
/// sind No-Ops, keine Fehler.
#[allow(async_fn_in_trait)]
pub trait UserRepository: Send + Sync {
    /// Einen neuen Benutzer anlegen
    async fn create(&self, data: NeuerBenutzer<'_>) -> DbResult<BenutzerRecord>;

    /// Einen Benutzer anhand seiner ID laden
    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<BenutzerRecord>>;

    /// Einen Benutzer anhand seiner (normalisierten) E-Mail laden
    async fn get_by_email(&self, email: &str) -> DbResult<Option<BenutzerRecord>>;

    /// Einen Benutzer aktualisieren
    async fn update(&self, id: Uuid, data: BenutzerUpdate) -> DbResult<BenutzerRecord>;

    /// Einen Benutzer loeschen
    async fn delete(&self, id: Uuid) -> DbResult<bool>;

    /// Eine Rolle der Rollenmenge des Benutzers hinzufuegen
    async fn add_role(&self, user_id: Uuid, role_id: Uuid) -> DbResult<BenutzerRecord>;

    /// Eine Rolle aus der Rollenmenge des Benutzers entfernen
    async fn remove_role(&self, user_id: Uuid, role_id: Uuid) -> DbResult<BenutzerRecord>;
}

/// Repository fuer Rollen-Datenzugriffe
#[allow(async_fn_in_trait)]
pub trait RoleRepository: Send + Sync {
    /// Eine neue Rolle anlegen
    async fn create(&self, data: NeueRolle<'_>) -> DbResult<RolleRecord>;

    /// Eine Rolle anhand ihrer ID laden
    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<RolleRecord>>;

    /// Eine Rolle anhand ihres Namens laden
    async fn get_by_name(&self, name: &str) -> DbResult<Option<RolleRecord>>;

    /// Eine Rolle aktualisieren
    async fn update(&self, id: Uuid, data: RollenUpdate) -> DbResult<RolleRecord>;

    /// Eine Rolle loeschen
    async fn delete(&self, id: Uuid) -> DbResult<bool>;

    /// Alle Rollen auflisten
    async fn list(&self) -> DbResult<Vec<RolleRecord>>;
}
