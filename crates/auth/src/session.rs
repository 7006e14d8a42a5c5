//! Serverseitige Sessions
//!
//! Schnittstelle und In-Memory-Implementierung fuer den session-basierten
//! AuthBackend-Modus. Der Kern definiert nur den Speicher-Vertrag
//! (erstellen/laden/verlaengern/invalidieren ueber eine opake ID); eine
//! externe Implementierung (z.B. Redis) kann den In-Memory-Speicher
//! ersetzen. Abmelden invalidiert die Session sofort serverseitig.

use std::{collections::HashMap, sync::Arc};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AuthResult;
use crate::zeit::Zeitquelle;

/// Eine aktive Session
#[derive(Debug, Clone)]
pub struct SessionEintrag {
    /// Opake Session-ID (URL-sicheres Base64, 256 Bit Entropie)
    pub id: String,
    pub user_id: Uuid,
    pub erstellt_am: DateTime<Utc>,
    pub laeuft_ab_am: DateTime<Utc>,
}

/// Speicher-Vertrag fuer serverseitige Sessions
#[allow(async_fn_in_trait)]
pub trait SessionSpeicher: Send + Sync {
    /// Erstellt eine neue Session fuer den Benutzer
    async fn erstellen(&self, user_id: Uuid) -> AuthResult<SessionEintrag>;

    /// Laedt eine Session; abgelaufene oder unbekannte IDs ergeben `None`
    async fn laden(&self, id: &str) -> AuthResult<Option<SessionEintrag>>;

    /// Verschiebt den Ablauf einer Session nach hinten (Erneuerung)
    async fn verlaengern(&self, id: &str) -> AuthResult<()>;

    /// Invalidiert eine Session sofort
    async fn invalidieren(&self, id: &str) -> AuthResult<()>;

    /// Invalidiert alle Sessions eines Benutzers, gibt die Anzahl zurueck
    async fn alle_invalidieren(&self, user_id: Uuid) -> AuthResult<usize>;
}

/// In-Memory-Implementierung mit TTL
pub struct MemorySessionSpeicher {
    sessions: RwLock<HashMap<String, SessionEintrag>>,
    ttl: chrono::Duration,
    uhr: Arc<dyn Zeitquelle>,
}

impl MemorySessionSpeicher {
    pub fn neu(ttl_sekunden: i64, uhr: Arc<dyn Zeitquelle>) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: chrono::Duration::seconds(ttl_sekunden),
            uhr,
        })
    }

    /// Entfernt abgelaufene Sessions, gibt die Anzahl der entfernten zurueck
    pub async fn aufraeumen(&self) -> usize {
        let jetzt = self.uhr.jetzt();
        let mut sessions = self.sessions.write().await;
        let vorher = sessions.len();
        sessions.retain(|_, s| s.laeuft_ab_am > jetzt);
        vorher - sessions.len()
    }

    /// Anzahl der aktuell gespeicherten Sessions
    pub async fn anzahl(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl SessionSpeicher for MemorySessionSpeicher {
    async fn erstellen(&self, user_id: Uuid) -> AuthResult<SessionEintrag> {
        let jetzt = self.uhr.jetzt();
        let eintrag = SessionEintrag {
            id: session_id_generieren(),
            user_id,
            erstellt_am: jetzt,
            laeuft_ab_am: jetzt + self.ttl,
        };

        self.sessions
            .write()
            .await
            .insert(eintrag.id.clone(), eintrag.clone());
        tracing::debug!(user_id = %user_id, "Neue Session erstellt");
        Ok(eintrag)
    }

    async fn laden(&self, id: &str) -> AuthResult<Option<SessionEintrag>> {
        let jetzt = self.uhr.jetzt();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(id) {
                None => return Ok(None),
                Some(eintrag) if eintrag.laeuft_ab_am > jetzt => {
                    return Ok(Some(eintrag.clone()))
                }
                Some(_) => {}
            }
        }

        // Abgelaufen: Eintrag direkt entfernen
        self.sessions.write().await.remove(id);
        Ok(None)
    }

    async fn verlaengern(&self, id: &str) -> AuthResult<()> {
        let jetzt = self.uhr.jetzt();
        let mut sessions = self.sessions.write().await;
        if let Some(eintrag) = sessions.get_mut(id) {
            eintrag.laeuft_ab_am = jetzt + self.ttl;
        }
        Ok(())
    }

    async fn invalidieren(&self, id: &str) -> AuthResult<()> {
        self.sessions.write().await.remove(id);
        tracing::debug!("Session invalidiert");
        Ok(())
    }

    async fn alle_invalidieren(&self, user_id: Uuid) -> AuthResult<usize> {
        let mut sessions = self.sessions.write().await;
        let vorher = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        let entfernt = vorher - sessions.len();
        if entfernt > 0 {
            tracing::debug!(user_id = %user_id, anzahl = entfernt, "Alle Benutzer-Sessions invalidiert");
        }
        Ok(entfernt)
    }
}

/// Generiert eine kryptografisch zufaellige Session-ID
fn session_id_generieren() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
