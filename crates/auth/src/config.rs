//! Konfiguration des Authentifizierungskerns
//!
//! Prozessweite, unveraenderliche Einstellungen. Das Laden aus Datei oder
//! Umgebung uebernimmt der Einbettende; hier stehen nur Struktur,
//! Standardwerte und Validierung.

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};
use crate::password::HashVerfahren;

/// Auswahl des AuthBackend-Mechanismus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendWahl {
    /// Zustandsloser signierter Session-Token (Abmelden nur clientseitig)
    #[default]
    SignierterToken,
    /// Serverseitige Session mit sofortiger Invalidierung beim Abmelden
    ServerSession,
}

/// Token-Lebensdauern je Zweck (Sekunden)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenTtl {
    pub verifizierung_sekunden: i64,
    pub passwort_reset_sekunden: i64,
    pub session_sekunden: i64,
}

impl Default for TokenTtl {
    fn default() -> Self {
        Self {
            verifizierung_sekunden: 24 * 60 * 60,
            passwort_reset_sekunden: 60 * 60,
            session_sekunden: 24 * 60 * 60,
        }
    }
}

/// Vollstaendige Konfiguration des Authentifizierungskerns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Prozessweites Signatur-Geheimnis (muss gesetzt werden)
    pub secret: String,
    /// Geordnete Hash-Verfahrensliste; der letzte Eintrag hasht neu
    pub hash_verfahren: Vec<HashVerfahren>,
    /// Muessen Benutzer ihre E-Mail verifizieren bevor sie sich anmelden?
    pub verifizierung_erforderlich: bool,
    /// Lebensdauern fuer ausgestellte Tokens
    pub token_ttl: TokenTtl,
    /// Uhrentoleranz fuer Ablaufvergleiche (Sekunden)
    pub uhr_toleranz_sekunden: i64,
    /// Gewaehlter AuthBackend-Mechanismus
    pub backend: BackendWahl,
    /// Gleitende Session-Verlaengerung bei jedem Zugriff (nur ServerSession)
    pub session_erneuerung: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            hash_verfahren: vec![HashVerfahren::argon2id_standard()],
            verifizierung_erforderlich: true,
            token_ttl: TokenTtl::default(),
            uhr_toleranz_sekunden: 0,
            backend: BackendWahl::default(),
            session_erneuerung: false,
        }
    }
}

impl AuthConfig {
    /// Validiert die Konfiguration
    ///
    /// Das Geheimnis muss 16, 24 oder 32 Zeichen lang sein (HMAC-Schluessel);
    /// die Verfahrensliste darf nicht leer sein und TTLs muessen positiv sein.
    pub fn pruefen(&self) -> AuthResult<()> {
        if ![16, 24, 32].contains(&self.secret.len()) {
            return Err(AuthError::Konfiguration(
                "secret muss 16, 24 oder 32 Zeichen lang sein".into(),
            ));
        }
        if self.hash_verfahren.is_empty() {
            return Err(AuthError::Konfiguration(
                "mindestens ein Hash-Verfahren erforderlich".into(),
            ));
        }
        let ttl = &self.token_ttl;
        if ttl.verifizierung_sekunden <= 0
            || ttl.passwort_reset_sekunden <= 0
            || ttl.session_sekunden <= 0
        {
            return Err(AuthError::Konfiguration(
                "Token-Lebensdauern muessen positiv sein".into(),
            ));
        }
        if self.uhr_toleranz_sekunden < 0 {
            return Err(AuthError::Konfiguration(
                "Uhrentoleranz darf nicht negativ sein".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gueltige_config() -> AuthConfig {
        AuthConfig {
            secret: "0123456789abcdef0123456789abcdef".into(),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn standardwerte_sind_gueltig_mit_secret() {
        assert!(gueltige_config().pruefen().is_ok());
    }

    #[test]
    fn fehlendes_secret_abgelehnt() {
        let config = AuthConfig::default();
        assert!(matches!(
            config.pruefen(),
            Err(AuthError::Konfiguration(_))
        ));
    }

    #[test]
    fn falsche_secret_laenge_abgelehnt() {
        let config = AuthConfig {
            secret: "zu-kurz".into(),
            ..AuthConfig::default()
        };
        assert!(config.pruefen().is_err());
    }

    #[test]
    fn negative_ttl_abgelehnt() {
        let mut config = gueltige_config();
        config.token_ttl.passwort_reset_sekunden = 0;
        assert!(config.pruefen().is_err());
    }

    #[test]
    fn config_serde_roundtrip() {
        let config = gueltige_config();
        let json = serde_json::to_string(&config).unwrap();
        let zurueck: AuthConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck.secret, config.secret);
        assert_eq!(zurueck.backend, BackendWahl::SignierterToken);
    }
}
