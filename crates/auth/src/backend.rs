//! AuthBackend – Mechanismus fuer "diese Anfrage ist Benutzer X"
//!
//! Zwei Varianten hinter demselben Vertrag, als getaggte Variante statt
//! Klassenhierarchie:
//! - signierter Token: zustandslos, keine Bindung an veraenderlichen
//!   Zustand; Abmelden ist damit grundsaetzlich nur clientseitig moeglich.
//! - serverseitige Session: opake ID in einem [`SessionSpeicher`];
//!   Abmelden invalidiert sofort.
//!
//! Beide Varianten liefern denselben [`AuthKontext`], sodass Guards und
//! Workflows den Mechanismus nicht kennen muessen.

use std::sync::Arc;

use uuid::Uuid;

use gatehouse_db::{BenutzerRecord, UserRepository};

use crate::config::{AuthConfig, BackendWahl};
use crate::error::AuthResult;
use crate::session::SessionSpeicher;
use crate::token::{TokenCodec, TokenZweck};

/// Ergebnis der Auswertung von Anfrage-Anmeldedaten
///
/// Transient, wird nie persistiert. `Anonym` heisst "keine gueltigen
/// Anmeldedaten" – ob ueberhaupt welche mitgeschickt wurden, ist fuer die
/// nachgelagerte Autorisierung unerheblich.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthKontext {
    Anonym,
    Angemeldet { user_id: Uuid, rollen: Vec<String> },
}

impl AuthKontext {
    pub fn ist_angemeldet(&self) -> bool {
        matches!(self, Self::Angemeldet { .. })
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Self::Anonym => None,
            Self::Angemeldet { user_id, .. } => Some(*user_id),
        }
    }
}

/// Der konkrete Mechanismus hinter dem Backend
enum Mechanik<S: SessionSpeicher> {
    SignierterToken {
        codec: Arc<TokenCodec>,
        ttl: chrono::Duration,
    },
    ServerSession {
        speicher: Arc<S>,
        erneuerung: bool,
    },
}

/// AuthBackend – stellt Ausweise aus und loest sie pro Anfrage auf
pub struct AuthBackend<U: UserRepository, S: SessionSpeicher> {
    user_repo: Arc<U>,
    mechanik: Mechanik<S>,
}

impl<U: UserRepository, S: SessionSpeicher> AuthBackend<U, S> {
    /// Erstellt ein zustandsloses Backend mit signierten Session-Tokens
    pub fn signierter_token(
        user_repo: Arc<U>,
        codec: Arc<TokenCodec>,
        ttl_sekunden: i64,
    ) -> Self {
        Self {
            user_repo,
            mechanik: Mechanik::SignierterToken {
                codec,
                ttl: chrono::Duration::seconds(ttl_sekunden),
            },
        }
    }

    /// Erstellt ein Backend mit serverseitigen Sessions
    pub fn server_session(user_repo: Arc<U>, speicher: Arc<S>, erneuerung: bool) -> Self {
        Self {
            user_repo,
            mechanik: Mechanik::ServerSession {
                speicher,
                erneuerung,
            },
        }
    }

    /// Waehlt die Variante anhand der Konfiguration
    ///
    /// Der Session-Speicher wird immer uebergeben, aber nur im
    /// Session-Modus benutzt.
    pub fn aus_config(
        config: &AuthConfig,
        user_repo: Arc<U>,
        codec: Arc<TokenCodec>,
        speicher: Arc<S>,
    ) -> Self {
        match config.backend {
            BackendWahl::SignierterToken => {
                Self::signierter_token(user_repo, codec, config.token_ttl.session_sekunden)
            }
            BackendWahl::ServerSession => {
                Self::server_session(user_repo, speicher, config.session_erneuerung)
            }
        }
    }

    /// Stellt nach erfolgreicher Anmeldung einen Ausweis aus
    ///
    /// Der Ausweis ist je nach Variante ein signierter Token oder eine
    /// opake Session-ID; der Aufrufer transportiert ihn (Cookie, Header).
    pub async fn anmelden(&self, benutzer: &BenutzerRecord) -> AuthResult<String> {
        match &self.mechanik {
            Mechanik::SignierterToken { codec, ttl } => {
                codec.ausstellen(benutzer.id, TokenZweck::AuthSession, *ttl, None)
            }
            Mechanik::ServerSession { speicher, .. } => {
                Ok(speicher.erstellen(benutzer.id).await?.id)
            }
        }
    }

    /// Loest Anfrage-Anmeldedaten in einen [`AuthKontext`] auf
    ///
    /// Ungueltige, abgelaufene oder zu gesperrten/unbekannten Benutzern
    /// gehoerende Ausweise ergeben `Anonym`; nur Repository-Fehler
    /// propagieren.
    pub async fn aufloesen(&self, ausweis: Option<&str>) -> AuthResult<AuthKontext> {
        let Some(ausweis) = ausweis else {
            return Ok(AuthKontext::Anonym);
        };

        let user_id = match &self.mechanik {
            Mechanik::SignierterToken { codec, .. } => {
                match codec.pruefen(ausweis, TokenZweck::AuthSession) {
                    Ok(daten) => daten.subjekt,
                    Err(fehler) => {
                        tracing::debug!(%fehler, "Session-Token abgelehnt");
                        return Ok(AuthKontext::Anonym);
                    }
                }
            }
            Mechanik::ServerSession {
                speicher,
                erneuerung,
            } => match speicher.laden(ausweis).await? {
                None => return Ok(AuthKontext::Anonym),
                Some(eintrag) => {
                    if *erneuerung {
                        speicher.verlaengern(ausweis).await?;
                    }
                    eintrag.user_id
                }
            },
        };

        let Some(benutzer) = self.user_repo.get_by_id(user_id).await? else {
            self.session_aufgeben(ausweis).await;
            return Ok(AuthKontext::Anonym);
        };

        if !benutzer.is_active {
            // Gesperrte Benutzer verlieren ihre Session sofort
            self.session_aufgeben(ausweis).await;
            return Ok(AuthKontext::Anonym);
        }

        Ok(AuthKontext::Angemeldet {
            user_id: benutzer.id,
            rollen: benutzer.rollen_namen(),
        })
    }

    /// Meldet einen Ausweis ab
    ///
    /// Serverseitige Sessions werden sofort invalidiert. Signierte Tokens
    /// bleiben bis zu ihrem Ablauf technisch gueltig; das Verwerfen liegt
    /// beim Client.
    pub async fn abmelden(&self, ausweis: &str) -> AuthResult<()> {
        match &self.mechanik {
            Mechanik::SignierterToken { .. } => {
                tracing::debug!("Abmeldung bei signiertem Token: nur clientseitig");
                Ok(())
            }
            Mechanik::ServerSession { speicher, .. } => speicher.invalidieren(ausweis).await,
        }
    }

    async fn session_aufgeben(&self, ausweis: &str) {
        if let Mechanik::ServerSession { speicher, .. } = &self.mechanik {
            let _ = speicher.invalidieren(ausweis).await;
        }
    }
}
