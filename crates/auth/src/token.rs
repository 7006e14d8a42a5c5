//! Signierte, zweckgebundene Einmal-Tokens
//!
//! Tokens sind HMAC-SHA256-signierte Claims (sub, aud, iat, exp, rg) und
//! vollstaendig zustandslos: es gibt keinen serverseitigen Token-Speicher.
//! Einmal-Verwendung entsteht ueber den Replay-Guard: ein bei Ausstellung
//! eingebetteter Digest ueber ein veraenderliches Feld des Subjekts
//! (Passwort-Hash), das der jeweilige Workflow bei Erfolg immer mutiert.
//! Ablaufvergleiche laufen ueber die injizierte [`Zeitquelle`] mit
//! konfigurierbarer Uhrentoleranz (Standard 0).

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::zeit::Zeitquelle;

/// Zweck eines Tokens
///
/// Ein Token ist nur fuer genau den Workflow gueltig fuer den es
/// ausgestellt wurde; der Zweck steht mit in der Signatur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenZweck {
    /// E-Mail-Verifizierung nach der Registrierung
    Verifizierung,
    /// Passwort-Reset ("Passwort vergessen")
    PasswortReset,
    /// Anmelde-Session (zustandsloses AuthBackend)
    AuthSession,
}

impl TokenZweck {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Verifizierung => "verification",
            Self::PasswortReset => "password_reset",
            Self::AuthSession => "auth_session",
        }
    }
}

/// Fehler bei der Token-Pruefung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenFehler {
    #[error("Token-Signatur ungueltig")]
    SignaturUngueltig,

    #[error("Token abgelaufen")]
    Abgelaufen,

    #[error("Token fuer anderen Zweck ausgestellt")]
    FalscherZweck,

    #[error("Replay-Guard veraltet")]
    ReplayGuardVeraltet,
}

/// Signierte Claims (Wire-Format)
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Subjekt: Benutzer-ID
    sub: String,
    /// Zweck-Tag
    aud: String,
    /// Ausstellungszeitpunkt (Unix-Sekunden)
    iat: i64,
    /// Ablaufzeitpunkt (Unix-Sekunden)
    exp: i64,
    /// Replay-Guard-Digest (fehlt bei Session-Tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rg: Option<String>,
}

/// Inhalt eines erfolgreich gepruefte Tokens
#[derive(Debug, Clone)]
pub struct TokenDaten {
    pub subjekt: Uuid,
    pub ausgestellt_am: DateTime<Utc>,
    /// Bei Ausstellung eingebetteter Replay-Guard
    pub replay_guard: Option<String>,
}

impl TokenDaten {
    /// Vergleicht den eingebetteten Replay-Guard mit dem aktuellen Wert
    ///
    /// Den aktuellen Wert leitet der Aufrufer frisch aus dem Datensatz des
    /// Subjekts ab. Abweichung bedeutet: das Feld wurde seit Ausstellung
    /// mutiert, das Token ist verbraucht.
    pub fn replay_guard_pruefen(&self, aktuell: Option<&str>) -> Result<(), TokenFehler> {
        if self.replay_guard.as_deref() == aktuell {
            Ok(())
        } else {
            Err(TokenFehler::ReplayGuardVeraltet)
        }
    }
}

/// Stellt signierte Tokens aus und prueft sie
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    /// Uhrentoleranz fuer Ablaufvergleiche
    toleranz: chrono::Duration,
    uhr: Arc<dyn Zeitquelle>,
}

impl TokenCodec {
    /// Erstellt einen Codec mit prozessweitem Geheimnis
    pub fn neu(secret: &str, toleranz_sekunden: i64, uhr: Arc<dyn Zeitquelle>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            toleranz: chrono::Duration::seconds(toleranz_sekunden),
            uhr,
        }
    }

    /// Stellt ein signiertes Token aus
    pub fn ausstellen(
        &self,
        subjekt: Uuid,
        zweck: TokenZweck,
        ttl: chrono::Duration,
        replay_guard: Option<String>,
    ) -> AuthResult<String> {
        let jetzt = self.uhr.jetzt();
        let claims = Claims {
            sub: subjekt.to_string(),
            aud: zweck.als_str().to_string(),
            iat: jetzt.timestamp(),
            exp: (jetzt + ttl).timestamp(),
            rg: replay_guard,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::intern(format!("Token-Kodierung fehlgeschlagen: {e}")))
    }

    /// Prueft Signatur, Zweck und Ablauf eines Tokens
    ///
    /// Der Replay-Guard wird hier nur extrahiert; der Vergleich mit dem
    /// aktuellen Wert laeuft ueber [`TokenDaten::replay_guard_pruefen`],
    /// weil der Aufrufer das Subjekt erst nach dem Dekodieren laden kann.
    pub fn pruefen(&self, token: &str, zweck: TokenZweck) -> Result<TokenDaten, TokenFehler> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[zweck.als_str()]);
        // Ablauf selbst pruefen: einzige Zeitquelle ist die injizierte Uhr
        validation.validate_exp = false;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidAudience => TokenFehler::FalscherZweck,
                _ => TokenFehler::SignaturUngueltig,
            })?
            .claims;

        let jetzt = self.uhr.jetzt();
        if jetzt.timestamp() > claims.exp + self.toleranz.num_seconds() {
            return Err(TokenFehler::Abgelaufen);
        }

        let subjekt = Uuid::parse_str(&claims.sub).map_err(|_| TokenFehler::SignaturUngueltig)?;
        let ausgestellt_am = Utc
            .timestamp_opt(claims.iat, 0)
            .single()
            .ok_or(TokenFehler::SignaturUngueltig)?;

        Ok(TokenDaten {
            subjekt,
            ausgestellt_am,
            replay_guard: claims.rg,
        })
    }
}

/// Leitet einen Replay-Guard-Digest aus einem Seed ab
///
/// SHA-256 ueber den Seed, URL-sicheres Base64. Das Token traegt damit nie
/// den Seed selbst (z.B. den Passwort-Hash), nur seinen Digest.
pub fn replay_guard(seed: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(seed.as_bytes()))
}
