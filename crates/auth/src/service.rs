//! UserAuthService – Orchestrierung der Benutzer-Workflows
//!
//! Der Service verknuepft [`PasswordManager`], [`TokenCodec`] und die
//! Repositories zu den eigentlichen Ablaeufen: Registrierung,
//! Anmeldung, Verifizierung, Passwort-Reset und Rollenverwaltung.
//! Er haelt keinen veraenderlichen Zustand; aller Zustand lebt in den
//! Repositories.
//!
//! Anpassung laeuft ueber den [`AuthHaken`]: Beobachtungs- und
//! Veto-Haken haben No-Op-Defaults, die Zustell-Delegaten fuer
//! Verifizierungs- und Reset-Tokens muss der Aufrufer liefern, weil der
//! Kern keinen Versandkanal kennt.

use std::sync::Arc;

use uuid::Uuid;

use gatehouse_db::{
    BenutzerRecord, BenutzerUpdate, DbError, NeueRolle, NeuerBenutzer, RoleRepository,
    RolleRecord, RollenUpdate, UserRepository,
};

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::password::PasswordManager;
use crate::token::{self, TokenCodec, TokenZweck};
use crate::zeit::Zeitquelle;

/// Anpassungspunkte der Workflows
///
/// Veto-Haken (`vor_*`) laufen vor dem ersten Schreibzugriff; ein Fehler
/// bricht den Workflow ab, bevor etwas persistiert wurde.
/// Beobachtungs-Haken (`nach_*`) laufen nach dem Persistieren. Alle Fehler
/// propagieren unveraendert an den Aufrufer.
#[allow(async_fn_in_trait)]
pub trait AuthHaken: Send + Sync {
    /// Veto vor dem Anlegen eines Benutzers (E-Mail bereits normalisiert)
    async fn vor_registrierung(&self, _email: &str) -> AuthResult<()> {
        Ok(())
    }

    /// Laeuft nach erfolgreichem Anlegen
    async fn nach_registrierung(&self, _benutzer: &BenutzerRecord) -> AuthResult<()> {
        Ok(())
    }

    /// Veto vor der Anmeldung (z.B. Ratenbegrenzung pro E-Mail)
    async fn vor_anmeldung(&self, _email: &str) -> AuthResult<()> {
        Ok(())
    }

    /// Laeuft nach erfolgreicher Anmeldung
    async fn nach_anmeldung(&self, _benutzer: &BenutzerRecord) -> AuthResult<()> {
        Ok(())
    }

    /// Laeuft nachdem ein Benutzer verifiziert wurde
    async fn nach_verifizierung(&self, _benutzer: &BenutzerRecord) -> AuthResult<()> {
        Ok(())
    }

    /// Stellt ein Verifizierungs-Token zu (kein Default, Kanal ist Sache
    /// des Aufrufers)
    async fn verifizierungs_token_senden(
        &self,
        benutzer: &BenutzerRecord,
        token: &str,
    ) -> AuthResult<()>;

    /// Stellt ein Passwort-Reset-Token zu (kein Default)
    async fn reset_token_senden(&self, benutzer: &BenutzerRecord, token: &str) -> AuthResult<()>;
}

/// Ordnet ein Repository-NichtGefunden dem Benutzer-Fehler zu
///
/// Damit melden alle Verwaltungsoperationen einen unbekannten Benutzer
/// einheitlich als [`AuthError::BenutzerNichtGefunden`].
fn benutzer_fehler(e: DbError, id: Uuid) -> AuthError {
    match e {
        DbError::NichtGefunden(_) => AuthError::BenutzerNichtGefunden(id.to_string()),
        andere => andere.into(),
    }
}

/// Ordnet ein Repository-NichtGefunden dem Rollen-Fehler zu
fn rollen_fehler(e: DbError, id: Uuid) -> AuthError {
    match e {
        DbError::NichtGefunden(_) => AuthError::RolleNichtGefunden(id.to_string()),
        andere => andere.into(),
    }
}

/// Normalisiert eine E-Mail-Adresse (trimmen, ASCII-Kleinschreibung)
///
/// Alle Workflows normalisieren vor jedem Vergleich und vor jedem
/// Schreibzugriff, damit "  Foo@Bar.COM" und "foo@bar.com" dasselbe
/// Konto treffen.
pub fn email_normalisieren(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Orchestriert alle Benutzer-Workflows
pub struct UserAuthService<U, R, H>
where
    U: UserRepository,
    R: RoleRepository,
    H: AuthHaken,
{
    user_repo: Arc<U>,
    role_repo: Arc<R>,
    haken: Arc<H>,
    passwoerter: PasswordManager,
    codec: Arc<TokenCodec>,
    config: AuthConfig,
}

impl<U, R, H> UserAuthService<U, R, H>
where
    U: UserRepository,
    R: RoleRepository,
    H: AuthHaken,
{
    /// Erstellt den Service aus validierter Konfiguration
    pub fn neu(
        user_repo: Arc<U>,
        role_repo: Arc<R>,
        haken: Arc<H>,
        config: AuthConfig,
        uhr: Arc<dyn Zeitquelle>,
    ) -> AuthResult<Self> {
        config.pruefen()?;
        let passwoerter = PasswordManager::neu(config.hash_verfahren.clone())?;
        let codec = Arc::new(TokenCodec::neu(
            &config.secret,
            config.uhr_toleranz_sekunden,
            uhr,
        ));
        Ok(Self {
            user_repo,
            role_repo,
            haken,
            passwoerter,
            codec,
            config,
        })
    }

    /// Der Token-Codec des Services, z.B. fuer den Aufbau eines
    /// [`AuthBackend`](crate::backend::AuthBackend)
    pub fn codec(&self) -> Arc<TokenCodec> {
        Arc::clone(&self.codec)
    }

    // -----------------------------------------------------------------------
    // Registrierung und Anmeldung
    // -----------------------------------------------------------------------

    /// Registriert einen neuen Benutzer
    ///
    /// Bei aktivierter Verifizierungspflicht entsteht der Benutzer
    /// unverifiziert und erhaelt sofort ein Verifizierungs-Token ueber
    /// den Zustell-Delegaten.
    pub async fn registrieren(&self, email: &str, passwort: &str) -> AuthResult<BenutzerRecord> {
        let email = email_normalisieren(email);

        if self.user_repo.get_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailVergeben(email));
        }

        self.haken.vor_registrierung(&email).await?;

        let hash = self.passwoerter.hashen(passwort)?;
        let benutzer = self
            .user_repo
            .create(NeuerBenutzer {
                email: &email,
                password_hash: &hash,
                is_active: true,
                is_verified: !self.config.verifizierung_erforderlich,
            })
            .await
            .map_err(|e| {
                // Gleichzeitige Registrierung derselben E-Mail loest die
                // Eindeutigkeitsverletzung des Repositories aus; beide
                // Aufrufer sehen denselben Fehler.
                if e.ist_eindeutigkeit() {
                    AuthError::EmailVergeben(email.clone())
                } else {
                    e.into()
                }
            })?;

        self.haken.nach_registrierung(&benutzer).await?;

        if self.config.verifizierung_erforderlich {
            self.verifizierung_einleiten(&benutzer).await?;
        }

        tracing::info!(user_id = %benutzer.id, "Benutzer registriert");
        Ok(benutzer)
    }

    /// Prueft E-Mail und Passwort und liefert den Benutzer
    ///
    /// Unbekannte E-Mail und falsches Passwort ergeben denselben Fehler;
    /// der Ablehnungspfad fuer unbekannte Konten verbrennt eine
    /// Dummy-Verifikation, damit beide Faelle gleich lange dauern.
    /// Den Ausweis stellt anschliessend das
    /// [`AuthBackend`](crate::backend::AuthBackend) aus.
    pub async fn anmelden(&self, email: &str, passwort: &str) -> AuthResult<BenutzerRecord> {
        let email = email_normalisieren(email);
        self.haken.vor_anmeldung(&email).await?;

        let Some(benutzer) = self.user_repo.get_by_email(&email).await? else {
            self.passwoerter.blind_pruefen(passwort);
            tracing::warn!("Anmeldung mit unbekannter E-Mail abgelehnt");
            return Err(AuthError::UngueltigeAnmeldedaten);
        };

        let pruefung = self.passwoerter.pruefen(passwort, &benutzer.password_hash);
        if !pruefung.gueltig {
            tracing::warn!(user_id = %benutzer.id, "Anmeldung mit falschem Passwort abgelehnt");
            return Err(AuthError::UngueltigeAnmeldedaten);
        }
        if !benutzer.is_active {
            tracing::warn!(user_id = %benutzer.id, "Anmeldung eines gesperrten Benutzers abgelehnt");
            return Err(AuthError::BenutzerGesperrt);
        }
        if self.config.verifizierung_erforderlich && !benutzer.is_verified {
            return Err(AuthError::NichtVerifiziert);
        }

        // Migration von Altverfahren: erst nach bestandener Pruefung liegt
        // das Klartextpasswort legitim vor
        let benutzer = if pruefung.neu_hashen {
            let neuer_hash = self.passwoerter.hashen(passwort)?;
            let aktualisiert = self
                .user_repo
                .update(
                    benutzer.id,
                    BenutzerUpdate {
                        password_hash: Some(neuer_hash),
                        ..Default::default()
                    },
                )
                .await?;
            tracing::info!(user_id = %benutzer.id, "Passwort-Hash migriert");
            aktualisiert
        } else {
            benutzer
        };

        self.haken.nach_anmeldung(&benutzer).await?;
        tracing::info!(user_id = %benutzer.id, "Benutzer angemeldet");
        Ok(benutzer)
    }

    // -----------------------------------------------------------------------
    // Verifizierung
    // -----------------------------------------------------------------------

    /// Stellt ein Verifizierungs-Token aus und uebergibt es dem
    /// Zustell-Delegaten
    ///
    /// Der Replay-Guard ist aus dem aktuellen Passwort-Hash abgeleitet;
    /// eine Passwortaenderung vor dem Einloesen entwertet das Token.
    pub async fn verifizierung_einleiten(&self, benutzer: &BenutzerRecord) -> AuthResult<()> {
        let token = self.codec.ausstellen(
            benutzer.id,
            TokenZweck::Verifizierung,
            chrono::Duration::seconds(self.config.token_ttl.verifizierung_sekunden),
            Some(token::replay_guard(&benutzer.password_hash)),
        )?;
        self.haken
            .verifizierungs_token_senden(benutzer, &token)
            .await?;
        tracing::debug!(user_id = %benutzer.id, "Verifizierungs-Token ausgestellt");
        Ok(())
    }

    /// Loest ein Verifizierungs-Token ein
    ///
    /// `is_verified` ist monoton: einmal gesetzt, nie wieder geloescht.
    /// Das Einloesen fuer einen bereits verifizierten Benutzer ist ein
    /// deterministischer No-Op, kein Fehler.
    pub async fn verifizieren(&self, token: &str) -> AuthResult<BenutzerRecord> {
        let daten = self.codec.pruefen(token, TokenZweck::Verifizierung)?;
        let benutzer = self
            .user_repo
            .get_by_id(daten.subjekt)
            .await?
            .ok_or_else(|| AuthError::BenutzerNichtGefunden(daten.subjekt.to_string()))?;

        if benutzer.is_verified {
            return Ok(benutzer);
        }

        daten.replay_guard_pruefen(Some(&token::replay_guard(&benutzer.password_hash)))?;

        let benutzer = self
            .user_repo
            .update(
                benutzer.id,
                BenutzerUpdate {
                    is_verified: Some(true),
                    ..Default::default()
                },
            )
            .await?;

        self.haken.nach_verifizierung(&benutzer).await?;
        tracing::info!(user_id = %benutzer.id, "Benutzer verifiziert");
        Ok(benutzer)
    }

    // -----------------------------------------------------------------------
    // Passwort-Reset
    // -----------------------------------------------------------------------

    /// Leitet einen Passwort-Reset ein
    ///
    /// Liefert immer `Ok(())`, unabhaengig davon ob ein Konto zur E-Mail
    /// existiert. Unbekannte und gesperrte Konten werden still
    /// uebersprungen, damit der Aufruf keine Kontenexistenz verraet.
    pub async fn passwort_reset_einleiten(&self, email: &str) -> AuthResult<()> {
        let email = email_normalisieren(email);

        let Some(benutzer) = self.user_repo.get_by_email(&email).await? else {
            tracing::debug!("Passwort-Reset fuer unbekannte E-Mail uebersprungen");
            return Ok(());
        };
        if !benutzer.is_active {
            tracing::debug!(user_id = %benutzer.id, "Passwort-Reset fuer gesperrten Benutzer uebersprungen");
            return Ok(());
        }

        let token = self.codec.ausstellen(
            benutzer.id,
            TokenZweck::PasswortReset,
            chrono::Duration::seconds(self.config.token_ttl.passwort_reset_sekunden),
            Some(token::replay_guard(&benutzer.password_hash)),
        )?;
        self.haken.reset_token_senden(&benutzer, &token).await?;
        tracing::info!(user_id = %benutzer.id, "Passwort-Reset eingeleitet");
        Ok(())
    }

    /// Loest ein Reset-Token ein und setzt ein neues Passwort
    ///
    /// Der Replay-Guard vergleicht gegen den aktuellen Passwort-Hash;
    /// das anschliessende Neu-Hashen entwertet damit jedes weitere noch
    /// laufende Reset-Token desselben Benutzers.
    pub async fn passwort_zuruecksetzen(
        &self,
        token: &str,
        neues_passwort: &str,
    ) -> AuthResult<()> {
        let daten = self.codec.pruefen(token, TokenZweck::PasswortReset)?;
        let benutzer = self
            .user_repo
            .get_by_id(daten.subjekt)
            .await?
            .ok_or_else(|| AuthError::BenutzerNichtGefunden(daten.subjekt.to_string()))?;

        daten.replay_guard_pruefen(Some(&token::replay_guard(&benutzer.password_hash)))?;

        let neuer_hash = self.passwoerter.hashen(neues_passwort)?;
        self.user_repo
            .update(
                benutzer.id,
                BenutzerUpdate {
                    password_hash: Some(neuer_hash),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(user_id = %benutzer.id, "Passwort zurueckgesetzt");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Rollenzuweisung
    // -----------------------------------------------------------------------

    /// Weist einem Benutzer eine Rolle zu (idempotent)
    pub async fn rolle_zuweisen(
        &self,
        user_id: Uuid,
        rollen_name: &str,
    ) -> AuthResult<BenutzerRecord> {
        let rolle = self.rolle_nach_name(rollen_name).await?;
        let benutzer = self.benutzer_laden(user_id).await?;

        if benutzer.hat_rolle(rollen_name) {
            return Ok(benutzer);
        }

        let benutzer = self.user_repo.add_role(user_id, rolle.id).await?;
        tracing::info!(user_id = %user_id, rolle = rollen_name, "Rolle zugewiesen");
        Ok(benutzer)
    }

    /// Entzieht einem Benutzer eine Rolle (idempotent)
    pub async fn rolle_entziehen(
        &self,
        user_id: Uuid,
        rollen_name: &str,
    ) -> AuthResult<BenutzerRecord> {
        let rolle = self.rolle_nach_name(rollen_name).await?;
        let benutzer = self.benutzer_laden(user_id).await?;

        if !benutzer.hat_rolle(rollen_name) {
            return Ok(benutzer);
        }

        let benutzer = self.user_repo.remove_role(user_id, rolle.id).await?;
        tracing::info!(user_id = %user_id, rolle = rollen_name, "Rolle entzogen");
        Ok(benutzer)
    }

    // -----------------------------------------------------------------------
    // Benutzerverwaltung
    // -----------------------------------------------------------------------

    /// Laedt einen Benutzer anhand seiner ID
    pub async fn benutzer_laden(&self, id: Uuid) -> AuthResult<BenutzerRecord> {
        self.user_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| AuthError::BenutzerNichtGefunden(id.to_string()))
    }

    /// Laedt einen Benutzer anhand seiner E-Mail (normalisiert)
    pub async fn benutzer_nach_email(&self, email: &str) -> AuthResult<BenutzerRecord> {
        let email = email_normalisieren(email);
        self.user_repo
            .get_by_email(&email)
            .await?
            .ok_or(AuthError::BenutzerNichtGefunden(email))
    }

    /// Aktualisiert einen Benutzer (administrativ)
    ///
    /// `is_verified` ist monoton: ein mitgegebenes `Some(false)` wird
    /// verworfen, die Verifizierung laesst sich nicht zuruecknehmen.
    pub async fn benutzer_aktualisieren(
        &self,
        id: Uuid,
        mut update: BenutzerUpdate,
    ) -> AuthResult<BenutzerRecord> {
        if let Some(email) = update.email.take() {
            update.email = Some(email_normalisieren(&email));
        }
        if update.is_verified == Some(false) {
            update.is_verified = None;
        }
        let neue_email = update.email.clone();
        self.user_repo.update(id, update).await.map_err(|e| {
            if e.ist_eindeutigkeit() {
                AuthError::EmailVergeben(neue_email.unwrap_or_default())
            } else {
                benutzer_fehler(e, id)
            }
        })
    }

    /// Loescht einen Benutzer endgueltig
    pub async fn benutzer_loeschen(&self, id: Uuid) -> AuthResult<()> {
        if !self.user_repo.delete(id).await? {
            return Err(AuthError::BenutzerNichtGefunden(id.to_string()));
        }
        tracing::info!(user_id = %id, "Benutzer geloescht");
        Ok(())
    }

    /// Sperrt einen Benutzer (reversibel, beendet keine Anmeldung ausser
    /// ueber das Backend bei der naechsten Aufloesung)
    pub async fn sperren(&self, id: Uuid) -> AuthResult<BenutzerRecord> {
        let benutzer = self
            .user_repo
            .update(
                id,
                BenutzerUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| benutzer_fehler(e, id))?;
        tracing::info!(user_id = %id, "Benutzer gesperrt");
        Ok(benutzer)
    }

    /// Hebt eine Sperre wieder auf
    pub async fn entsperren(&self, id: Uuid) -> AuthResult<BenutzerRecord> {
        let benutzer = self
            .user_repo
            .update(
                id,
                BenutzerUpdate {
                    is_active: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| benutzer_fehler(e, id))?;
        tracing::info!(user_id = %id, "Benutzer entsperrt");
        Ok(benutzer)
    }

    // -----------------------------------------------------------------------
    // Rollenverwaltung
    // -----------------------------------------------------------------------

    /// Legt eine neue Rolle an
    pub async fn rolle_erstellen(
        &self,
        name: &str,
        beschreibung: Option<&str>,
    ) -> AuthResult<RolleRecord> {
        let rolle = self
            .role_repo
            .create(NeueRolle { name, beschreibung })
            .await?;
        tracing::info!(rolle = name, "Rolle angelegt");
        Ok(rolle)
    }

    /// Laedt eine Rolle anhand ihres Namens
    pub async fn rolle_nach_name(&self, name: &str) -> AuthResult<RolleRecord> {
        self.role_repo
            .get_by_name(name)
            .await?
            .ok_or_else(|| AuthError::RolleNichtGefunden(name.to_string()))
    }

    /// Aktualisiert eine Rolle
    pub async fn rolle_aktualisieren(
        &self,
        id: Uuid,
        update: RollenUpdate,
    ) -> AuthResult<RolleRecord> {
        self.role_repo
            .update(id, update)
            .await
            .map_err(|e| rollen_fehler(e, id))
    }

    /// Loescht eine Rolle
    pub async fn rolle_loeschen(&self, id: Uuid) -> AuthResult<()> {
        if !self.role_repo.delete(id).await? {
            return Err(AuthError::RolleNichtGefunden(id.to_string()));
        }
        Ok(())
    }

    /// Listet alle Rollen auf
    pub async fn rollen_auflisten(&self) -> AuthResult<Vec<RolleRecord>> {
        Ok(self.role_repo.list().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use chrono::Utc;
    use gatehouse_db::{DbError, DbResult};

    use crate::config::TokenTtl;
    use crate::password::HashVerfahren;
    use crate::token::TokenFehler;
    use crate::zeit::SystemZeit;

    // --- In-Memory-Repositories ---

    #[derive(Default)]
    struct TestUserRepo {
        benutzer: Mutex<Vec<BenutzerRecord>>,
        rollen: Mutex<Vec<RolleRecord>>,
    }

    impl UserRepository for TestUserRepo {
        async fn create(&self, data: NeuerBenutzer<'_>) -> DbResult<BenutzerRecord> {
            let mut benutzer = self.benutzer.lock().unwrap();
            if benutzer.iter().any(|u| u.email == data.email) {
                return Err(DbError::eindeutigkeit(data.email));
            }
            let record = BenutzerRecord {
                id: Uuid::new_v4(),
                email: data.email.to_string(),
                password_hash: data.password_hash.to_string(),
                is_active: data.is_active,
                is_verified: data.is_verified,
                rollen: vec![],
                created_at: Utc::now(),
            };
            benutzer.push(record.clone());
            Ok(record)
        }

        async fn get_by_id(&self, id: Uuid) -> DbResult<Option<BenutzerRecord>> {
            Ok(self
                .benutzer
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.id == id)
                .cloned())
        }

        async fn get_by_email(&self, email: &str) -> DbResult<Option<BenutzerRecord>> {
            Ok(self
                .benutzer
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.email == email)
                .cloned())
        }

        async fn update(&self, id: Uuid, data: BenutzerUpdate) -> DbResult<BenutzerRecord> {
            let mut benutzer = self.benutzer.lock().unwrap();
            let user = benutzer
                .iter_mut()
                .find(|u| u.id == id)
                .ok_or_else(|| DbError::nicht_gefunden(id.to_string()))?;
            if let Some(email) = data.email {
                user.email = email;
            }
            if let Some(hash) = data.password_hash {
                user.password_hash = hash;
            }
            if let Some(aktiv) = data.is_active {
                user.is_active = aktiv;
            }
            if let Some(verifiziert) = data.is_verified {
                user.is_verified = verifiziert;
            }
            Ok(user.clone())
        }

        async fn delete(&self, id: Uuid) -> DbResult<bool> {
            let mut benutzer = self.benutzer.lock().unwrap();
            let vorher = benutzer.len();
            benutzer.retain(|u| u.id != id);
            Ok(benutzer.len() < vorher)
        }

        async fn add_role(&self, user_id: Uuid, role_id: Uuid) -> DbResult<BenutzerRecord> {
            let rolle = self
                .rollen
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == role_id)
                .cloned()
                .ok_or_else(|| DbError::nicht_gefunden(role_id.to_string()))?;
            let mut benutzer = self.benutzer.lock().unwrap();
            let user = benutzer
                .iter_mut()
                .find(|u| u.id == user_id)
                .ok_or_else(|| DbError::nicht_gefunden(user_id.to_string()))?;
            if !user.rollen.iter().any(|r| r.id == role_id) {
                user.rollen.push(rolle);
            }
            Ok(user.clone())
        }

        async fn remove_role(&self, user_id: Uuid, role_id: Uuid) -> DbResult<BenutzerRecord> {
            let mut benutzer = self.benutzer.lock().unwrap();
            let user = benutzer
                .iter_mut()
                .find(|u| u.id == user_id)
                .ok_or_else(|| DbError::nicht_gefunden(user_id.to_string()))?;
            user.rollen.retain(|r| r.id != role_id);
            Ok(user.clone())
        }
    }

    impl RoleRepository for TestUserRepo {
        async fn create(&self, data: NeueRolle<'_>) -> DbResult<RolleRecord> {
            let mut rollen = self.rollen.lock().unwrap();
            if rollen.iter().any(|r| r.name == data.name) {
                return Err(DbError::eindeutigkeit(data.name));
            }
            let record = RolleRecord {
                id: Uuid::new_v4(),
                name: data.name.to_string(),
                beschreibung: data.beschreibung.map(str::to_string),
            };
            rollen.push(record.clone());
            Ok(record)
        }

        async fn get_by_id(&self, id: Uuid) -> DbResult<Option<RolleRecord>> {
            Ok(self
                .rollen
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .cloned())
        }

        async fn get_by_name(&self, name: &str) -> DbResult<Option<RolleRecord>> {
            Ok(self
                .rollen
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.name == name)
                .cloned())
        }

        async fn update(&self, id: Uuid, data: RollenUpdate) -> DbResult<RolleRecord> {
            let mut rollen = self.rollen.lock().unwrap();
            let rolle = rollen
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| DbError::nicht_gefunden(id.to_string()))?;
            if let Some(name) = data.name {
                rolle.name = name;
            }
            if let Some(beschreibung) = data.beschreibung {
                rolle.beschreibung = beschreibung;
            }
            Ok(rolle.clone())
        }

        async fn delete(&self, id: Uuid) -> DbResult<bool> {
            let mut rollen = self.rollen.lock().unwrap();
            let vorher = rollen.len();
            rollen.retain(|r| r.id != id);
            Ok(rollen.len() < vorher)
        }

        async fn list(&self) -> DbResult<Vec<RolleRecord>> {
            Ok(self.rollen.lock().unwrap().clone())
        }
    }

    // --- Haken, der zugestellte Tokens einfaengt ---

    #[derive(Default)]
    struct TestHaken {
        verifizierungs_tokens: Mutex<Vec<String>>,
        reset_tokens: Mutex<Vec<String>>,
        registrierung_sperren: Mutex<Option<String>>,
    }

    impl TestHaken {
        fn letztes_verifizierungs_token(&self) -> Option<String> {
            self.verifizierungs_tokens.lock().unwrap().last().cloned()
        }

        fn letztes_reset_token(&self) -> Option<String> {
            self.reset_tokens.lock().unwrap().last().cloned()
        }
    }

    impl AuthHaken for TestHaken {
        async fn vor_registrierung(&self, email: &str) -> AuthResult<()> {
            if let Some(gesperrt) = self.registrierung_sperren.lock().unwrap().as_deref() {
                if email.ends_with(gesperrt) {
                    return Err(AuthError::hook_abgebrochen("Domain gesperrt"));
                }
            }
            Ok(())
        }

        async fn verifizierungs_token_senden(
            &self,
            _benutzer: &BenutzerRecord,
            token: &str,
        ) -> AuthResult<()> {
            self.verifizierungs_tokens
                .lock()
                .unwrap()
                .push(token.to_string());
            Ok(())
        }

        async fn reset_token_senden(
            &self,
            _benutzer: &BenutzerRecord,
            token: &str,
        ) -> AuthResult<()> {
            self.reset_tokens.lock().unwrap().push(token.to_string());
            Ok(())
        }
    }

    type TestService = UserAuthService<TestUserRepo, TestUserRepo, TestHaken>;

    // Schwache Parameter, damit die Tests nicht an Argon2 haengen
    fn test_verfahren() -> Vec<HashVerfahren> {
        vec![HashVerfahren::Argon2id {
            m_cost: 8 * 1024,
            t_cost: 1,
            p_cost: 1,
        }]
    }

    fn test_config(verfahren: Vec<HashVerfahren>) -> AuthConfig {
        AuthConfig {
            secret: "0123456789abcdef0123456789abcdef".into(),
            hash_verfahren: verfahren,
            verifizierung_erforderlich: true,
            token_ttl: TokenTtl::default(),
            ..Default::default()
        }
    }

    fn aufbau() -> (TestService, Arc<TestUserRepo>, Arc<TestHaken>) {
        aufbau_mit(test_config(test_verfahren()))
    }

    fn aufbau_mit(config: AuthConfig) -> (TestService, Arc<TestUserRepo>, Arc<TestHaken>) {
        let repo = Arc::new(TestUserRepo::default());
        let haken = Arc::new(TestHaken::default());
        let service = UserAuthService::neu(
            Arc::clone(&repo),
            Arc::clone(&repo),
            Arc::clone(&haken),
            config,
            Arc::new(SystemZeit),
        )
        .unwrap();
        (service, repo, haken)
    }

    #[tokio::test]
    async fn registrieren_verifizieren_anmelden() {
        let (service, _repo, haken) = aufbau();

        let benutzer = service
            .registrieren("  Neu@Example.COM ", "geheim_123!")
            .await
            .unwrap();
        assert_eq!(benutzer.email, "neu@example.com", "E-Mail normalisiert");
        assert!(!benutzer.is_verified);

        // Vor der Verifizierung keine Anmeldung
        let fehler = service
            .anmelden("neu@example.com", "geheim_123!")
            .await
            .unwrap_err();
        assert!(matches!(fehler, AuthError::NichtVerifiziert));

        let token = haken.letztes_verifizierungs_token().expect("Token zugestellt");
        let verifiziert = service.verifizieren(&token).await.unwrap();
        assert!(verifiziert.is_verified);

        let angemeldet = service
            .anmelden("neu@example.com", "geheim_123!")
            .await
            .unwrap();
        assert_eq!(angemeldet.id, benutzer.id);
    }

    #[tokio::test]
    async fn doppelte_registrierung_wird_abgelehnt() {
        let (service, _repo, _haken) = aufbau();
        service.registrieren("a@example.com", "pw_eins!").await.unwrap();

        let fehler = service
            .registrieren("A@example.com", "pw_zwei!")
            .await
            .unwrap_err();
        assert!(matches!(fehler, AuthError::EmailVergeben(_)));
    }

    /// Verlierer-Seite eines gleichzeitigen Registrierungs-Wettlaufs:
    /// die Vorpruefung sieht noch keinen Benutzer, das Anlegen selbst
    /// scheitert dann an der Eindeutigkeit.
    struct WettlaufRepo;

    impl UserRepository for WettlaufRepo {
        async fn create(&self, data: NeuerBenutzer<'_>) -> DbResult<BenutzerRecord> {
            Err(DbError::eindeutigkeit(data.email))
        }

        async fn get_by_id(&self, _id: Uuid) -> DbResult<Option<BenutzerRecord>> {
            Ok(None)
        }

        async fn get_by_email(&self, _email: &str) -> DbResult<Option<BenutzerRecord>> {
            Ok(None)
        }

        async fn update(&self, id: Uuid, _data: BenutzerUpdate) -> DbResult<BenutzerRecord> {
            Err(DbError::nicht_gefunden(id.to_string()))
        }

        async fn delete(&self, _id: Uuid) -> DbResult<bool> {
            Ok(false)
        }

        async fn add_role(&self, user_id: Uuid, _role_id: Uuid) -> DbResult<BenutzerRecord> {
            Err(DbError::nicht_gefunden(user_id.to_string()))
        }

        async fn remove_role(&self, user_id: Uuid, _role_id: Uuid) -> DbResult<BenutzerRecord> {
            Err(DbError::nicht_gefunden(user_id.to_string()))
        }
    }

    #[tokio::test]
    async fn wettlauf_registrierung_meldet_email_vergeben() {
        let service = UserAuthService::neu(
            Arc::new(WettlaufRepo),
            Arc::new(TestUserRepo::default()),
            Arc::new(TestHaken::default()),
            test_config(test_verfahren()),
            Arc::new(SystemZeit),
        )
        .unwrap();

        let fehler = service
            .registrieren("gleichzeitig@example.com", "pw_123!")
            .await
            .unwrap_err();
        assert!(
            matches!(fehler, AuthError::EmailVergeben(_)),
            "Eindeutigkeitsverletzung muss als EmailVergeben ankommen, war: {fehler:?}"
        );
    }

    #[tokio::test]
    async fn unbekannte_email_und_falsches_passwort_ununterscheidbar() {
        let (service, _repo, haken) = aufbau();
        service.registrieren("a@example.com", "richtig_1!").await.unwrap();
        let token = haken.letztes_verifizierungs_token().unwrap();
        service.verifizieren(&token).await.unwrap();

        let unbekannt = service
            .anmelden("niemand@example.com", "egal")
            .await
            .unwrap_err();
        let falsch = service.anmelden("a@example.com", "falsch").await.unwrap_err();

        assert!(matches!(unbekannt, AuthError::UngueltigeAnmeldedaten));
        assert!(matches!(falsch, AuthError::UngueltigeAnmeldedaten));
        assert_eq!(unbekannt.to_string(), falsch.to_string());
    }

    #[tokio::test]
    async fn gesperrter_benutzer_kann_sich_nicht_anmelden() {
        let (service, _repo, haken) = aufbau();
        let benutzer = service.registrieren("a@example.com", "pw_123!").await.unwrap();
        let token = haken.letztes_verifizierungs_token().unwrap();
        service.verifizieren(&token).await.unwrap();

        service.sperren(benutzer.id).await.unwrap();
        let fehler = service.anmelden("a@example.com", "pw_123!").await.unwrap_err();
        assert!(matches!(fehler, AuthError::BenutzerGesperrt));

        service.entsperren(benutzer.id).await.unwrap();
        assert!(service.anmelden("a@example.com", "pw_123!").await.is_ok());
    }

    #[tokio::test]
    async fn verifizieren_ist_idempotent() {
        let (service, _repo, haken) = aufbau();
        service.registrieren("a@example.com", "pw_123!").await.unwrap();
        let token = haken.letztes_verifizierungs_token().unwrap();

        service.verifizieren(&token).await.unwrap();
        // Zweites Einloesen ist ein No-Op, kein Fehler
        let benutzer = service.verifizieren(&token).await.unwrap();
        assert!(benutzer.is_verified);
    }

    #[tokio::test]
    async fn verifizierungs_token_verfaellt_bei_passwortaenderung() {
        let (service, _repo, haken) = aufbau();
        service.registrieren("a@example.com", "pw_123!").await.unwrap();
        let altes_token = haken.letztes_verifizierungs_token().unwrap();

        service.passwort_reset_einleiten("a@example.com").await.unwrap();
        let reset = haken.letztes_reset_token().unwrap();
        service.passwort_zuruecksetzen(&reset, "neues_pw_456!").await.unwrap();

        let fehler = service.verifizieren(&altes_token).await.unwrap_err();
        assert!(matches!(
            fehler,
            AuthError::Token(TokenFehler::ReplayGuardVeraltet)
        ));
    }

    #[tokio::test]
    async fn reset_einleiten_verraet_keine_kontenexistenz() {
        let (service, _repo, haken) = aufbau();

        // Unbekannte E-Mail: Ok, aber kein Token zugestellt
        service
            .passwort_reset_einleiten("niemand@example.com")
            .await
            .unwrap();
        assert!(haken.letztes_reset_token().is_none());

        // Gesperrtes Konto: ebenfalls still uebersprungen
        let benutzer = service.registrieren("a@example.com", "pw_123!").await.unwrap();
        service.sperren(benutzer.id).await.unwrap();
        service.passwort_reset_einleiten("a@example.com").await.unwrap();
        assert!(haken.letztes_reset_token().is_none());
    }

    #[tokio::test]
    async fn reset_token_ist_einmal_verwendbar() {
        let (service, _repo, haken) = aufbau();
        service.registrieren("a@example.com", "pw_123!").await.unwrap();

        service.passwort_reset_einleiten("a@example.com").await.unwrap();
        let token = haken.letztes_reset_token().unwrap();

        service.passwort_zuruecksetzen(&token, "neu_eins_1!").await.unwrap();
        let fehler = service
            .passwort_zuruecksetzen(&token, "neu_zwei_2!")
            .await
            .unwrap_err();
        assert!(matches!(
            fehler,
            AuthError::Token(TokenFehler::ReplayGuardVeraltet)
        ));
    }

    #[tokio::test]
    async fn reset_token_gilt_nicht_als_verifizierungs_token() {
        let (service, _repo, haken) = aufbau();
        service.registrieren("a@example.com", "pw_123!").await.unwrap();
        service.passwort_reset_einleiten("a@example.com").await.unwrap();

        let reset = haken.letztes_reset_token().unwrap();
        let fehler = service.verifizieren(&reset).await.unwrap_err();
        assert!(matches!(fehler, AuthError::Token(TokenFehler::FalscherZweck)));
    }

    #[tokio::test]
    async fn anmeldung_migriert_altverfahren() {
        let config = test_config(vec![
            HashVerfahren::Bcrypt { cost: 6 },
            HashVerfahren::Argon2id {
                m_cost: 8 * 1024,
                t_cost: 1,
                p_cost: 1,
            },
        ]);
        let (service, repo, _haken) = aufbau_mit(config);

        // Altbestand: Benutzer mit bcrypt-Hash direkt im Repository
        let alter_hash = bcrypt::hash("wanderndes_pw", 6).unwrap();
        UserRepository::create(
            repo.as_ref(),
            NeuerBenutzer {
                email: "alt@example.com",
                password_hash: &alter_hash,
                is_active: true,
                is_verified: true,
            },
        )
        .await
        .unwrap();

        service.anmelden("alt@example.com", "wanderndes_pw").await.unwrap();

        let migriert = repo.get_by_email("alt@example.com").await.unwrap().unwrap();
        assert!(
            migriert.password_hash.starts_with("$argon2id$"),
            "Hash muss nach der Anmeldung migriert sein"
        );
        // Das alte Passwort funktioniert weiterhin
        assert!(service.anmelden("alt@example.com", "wanderndes_pw").await.is_ok());
    }

    #[tokio::test]
    async fn rollen_zuweisen_und_entziehen_idempotent() {
        let (service, _repo, haken) = aufbau();
        let benutzer = service.registrieren("a@example.com", "pw_123!").await.unwrap();
        let token = haken.letztes_verifizierungs_token().unwrap();
        service.verifizieren(&token).await.unwrap();

        service.rolle_erstellen("admin", Some("Vollzugriff")).await.unwrap();

        let mit_rolle = service.rolle_zuweisen(benutzer.id, "admin").await.unwrap();
        assert!(mit_rolle.hat_rolle("admin"));

        // Doppeltes Zuweisen ist ein No-Op
        let nochmal = service.rolle_zuweisen(benutzer.id, "admin").await.unwrap();
        assert_eq!(nochmal.rollen.len(), 1);

        let ohne = service.rolle_entziehen(benutzer.id, "admin").await.unwrap();
        assert!(!ohne.hat_rolle("admin"));
        // Doppeltes Entziehen ebenfalls
        assert!(service.rolle_entziehen(benutzer.id, "admin").await.is_ok());
    }

    #[tokio::test]
    async fn unbekannte_rolle_ist_ein_fehler() {
        let (service, _repo, _haken) = aufbau();
        let benutzer = service.registrieren("a@example.com", "pw_123!").await.unwrap();

        let fehler = service
            .rolle_zuweisen(benutzer.id, "gibt_es_nicht")
            .await
            .unwrap_err();
        assert!(matches!(fehler, AuthError::RolleNichtGefunden(_)));
    }

    #[tokio::test]
    async fn veto_haken_bricht_vor_persistenz_ab() {
        let (service, repo, haken) = aufbau();
        *haken.registrierung_sperren.lock().unwrap() = Some("@blocked.example".into());

        let fehler = service
            .registrieren("wer@blocked.example", "pw_123!")
            .await
            .unwrap_err();
        assert!(matches!(fehler, AuthError::HookAbgebrochen(_)));
        assert!(
            repo.get_by_email("wer@blocked.example").await.unwrap().is_none(),
            "Veto darf nichts persistieren"
        );
    }

    #[tokio::test]
    async fn ohne_verifizierungspflicht_sofort_anmeldbar() {
        let mut config = test_config(test_verfahren());
        config.verifizierung_erforderlich = false;
        let (service, _repo, haken) = aufbau_mit(config);

        let benutzer = service.registrieren("a@example.com", "pw_123!").await.unwrap();
        assert!(benutzer.is_verified);
        assert!(haken.letztes_verifizierungs_token().is_none());
        assert!(service.anmelden("a@example.com", "pw_123!").await.is_ok());
    }

    #[tokio::test]
    async fn benutzerverwaltung_rundlauf() {
        let (service, _repo, _haken) = aufbau();
        let benutzer = service.registrieren("a@example.com", "pw_123!").await.unwrap();

        let geladen = service.benutzer_nach_email(" A@Example.com ").await.unwrap();
        assert_eq!(geladen.id, benutzer.id);

        service.benutzer_loeschen(benutzer.id).await.unwrap();
        let fehler = service.benutzer_laden(benutzer.id).await.unwrap_err();
        assert!(matches!(fehler, AuthError::BenutzerNichtGefunden(_)));
    }

    #[tokio::test]
    async fn sperren_unbekannter_benutzer_meldet_nicht_gefunden() {
        let (service, _repo, _haken) = aufbau();
        let fremde_id = Uuid::new_v4();

        let fehler = service.sperren(fremde_id).await.unwrap_err();
        assert!(matches!(fehler, AuthError::BenutzerNichtGefunden(_)));

        let fehler = service.entsperren(fremde_id).await.unwrap_err();
        assert!(matches!(fehler, AuthError::BenutzerNichtGefunden(_)));
    }

    #[tokio::test]
    async fn verifizierung_laesst_sich_nicht_administrativ_zuruecknehmen() {
        let (service, _repo, haken) = aufbau();
        let benutzer = service.registrieren("a@example.com", "pw_123!").await.unwrap();
        let token = haken.letztes_verifizierungs_token().unwrap();
        service.verifizieren(&token).await.unwrap();

        let aktualisiert = service
            .benutzer_aktualisieren(
                benutzer.id,
                BenutzerUpdate {
                    is_verified: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(aktualisiert.is_verified, "is_verified ist monoton");
    }

    #[tokio::test]
    async fn rollenverwaltung_rundlauf() {
        let (service, _repo, _haken) = aufbau();

        let rolle = service.rolle_erstellen("support", None).await.unwrap();
        assert_eq!(service.rollen_auflisten().await.unwrap().len(), 1);

        let umbenannt = service
            .rolle_aktualisieren(
                rolle.id,
                RollenUpdate {
                    name: Some("helpdesk".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(umbenannt.name, "helpdesk");

        service.rolle_loeschen(rolle.id).await.unwrap();
        assert!(service.rollen_auflisten().await.unwrap().is_empty());
    }
}
