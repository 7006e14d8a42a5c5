//! Passwort-Hashing mit konfigurierbarer Verfahrensliste
//!
//! Neue Hashes entstehen immer mit dem zuletzt konfigurierten Verfahren
//! (Argon2id gemaess OWASP-Richtlinien als Standard). Zur Migration von
//! Altbestaenden verifiziert der Manager zusaetzlich alle weiteren
//! konfigurierten Verfahren und meldet `neu_hashen`, wenn der gespeicherte
//! Hash nicht mehr dem bevorzugten Verfahren samt Parametern entspricht.
//! Das Neu-Hashen und Persistieren uebernimmt der Aufrufer nach
//! erfolgreicher Authentifizierung; `pruefen` selbst schreibt nie.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params, Version,
};

use crate::error::{AuthError, AuthResult};

/// Ein konfigurierbares Hash-Verfahren
///
/// Die Liste im [`PasswordManager`] ist geordnet; der letzte Eintrag
/// gewinnt als Verfahren fuer neue Hashes, alle Eintraege werden bei der
/// Verifikation akzeptiert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "typ", rename_all = "snake_case")]
pub enum HashVerfahren {
    /// Argon2id mit expliziten Kostenparametern
    Argon2id {
        /// Speicher in KiB
        m_cost: u32,
        /// Iterationen
        t_cost: u32,
        /// Parallelismus
        p_cost: u32,
    },
    /// bcrypt (nur fuer Altbestaende)
    Bcrypt { cost: u32 },
}

impl HashVerfahren {
    /// Argon2id-Parameter gemaess OWASP-Empfehlungen (Stand 2024):
    /// 64 MiB Speicher, 3 Iterationen, 1 Thread
    pub fn argon2id_standard() -> Self {
        Self::Argon2id {
            m_cost: 64 * 1024,
            t_cost: 3,
            p_cost: 1,
        }
    }

    /// Ordnet einen gespeicherten Hash anhand seines Praefixes zu
    fn passt_zu(&self, hash: &str) -> bool {
        match self {
            Self::Argon2id { .. } => hash.starts_with("$argon2"),
            Self::Bcrypt { .. } => hash.starts_with("$2"),
        }
    }
}

/// Ergebnis einer Passwort-Verifikation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswortPruefung {
    /// Passwort stimmt mit dem gespeicherten Hash ueberein
    pub gueltig: bool,
    /// Hash stammt aus einem Altverfahren oder hat veraltete Parameter
    pub neu_hashen: bool,
}

impl PasswortPruefung {
    fn abgelehnt() -> Self {
        Self {
            gueltig: false,
            neu_hashen: false,
        }
    }
}

/// Passwort-Manager mit geordneter Verfahrensliste
pub struct PasswordManager {
    verfahren: Vec<HashVerfahren>,
    /// Vorgefertigter Hash fuer zeitkonstante Ablehnung unbekannter Konten
    dummy_hash: String,
}

impl PasswordManager {
    /// Erstellt einen Manager mit der angegebenen Verfahrensliste
    ///
    /// Der letzte Eintrag wird fuer neue Hashes verwendet.
    pub fn neu(verfahren: Vec<HashVerfahren>) -> AuthResult<Self> {
        if verfahren.is_empty() {
            return Err(AuthError::Konfiguration(
                "mindestens ein Hash-Verfahren erforderlich".into(),
            ));
        }
        let mut manager = Self {
            verfahren,
            dummy_hash: String::new(),
        };
        manager.dummy_hash = manager.hashen("gatehouse-dummy")?;
        Ok(manager)
    }

    /// Erstellt einen Manager mit dem Argon2id-Standardverfahren
    pub fn standard() -> AuthResult<Self> {
        Self::neu(vec![HashVerfahren::argon2id_standard()])
    }

    /// Das Verfahren fuer neue Hashes (letzter Listeneintrag)
    fn bevorzugt(&self) -> HashVerfahren {
        *self.verfahren.last().expect("Liste nie leer (siehe neu)")
    }

    /// Hasht ein Passwort mit dem bevorzugten Verfahren und zufaelligem Salt
    pub fn hashen(&self, passwort: &str) -> AuthResult<String> {
        match self.bevorzugt() {
            HashVerfahren::Argon2id {
                m_cost,
                t_cost,
                p_cost,
            } => {
                let salt = SaltString::generate(&mut OsRng);
                argon2_instanz(m_cost, t_cost, p_cost)?
                    .hash_password(passwort.as_bytes(), &salt)
                    .map(|hash| hash.to_string())
                    .map_err(|e| AuthError::PasswortHashing(e.to_string()))
            }
            HashVerfahren::Bcrypt { cost } => bcrypt::hash(passwort, cost)
                .map_err(|e| AuthError::PasswortHashing(e.to_string())),
        }
    }

    /// Verifiziert ein Passwort gegen einen gespeicherten Hash
    ///
    /// Total: fehlerhafte oder nicht konfigurierte Hash-Formate werden als
    /// `gueltig = false` gemeldet, nie als Fehler.
    pub fn pruefen(&self, passwort: &str, hash: &str) -> PasswortPruefung {
        let Some(verfahren) = self.verfahren.iter().find(|v| v.passt_zu(hash)) else {
            return PasswortPruefung::abgelehnt();
        };

        let gueltig = match verfahren {
            HashVerfahren::Argon2id { .. } => argon2_verifizieren(passwort, hash),
            HashVerfahren::Bcrypt { .. } => bcrypt::verify(passwort, hash).unwrap_or(false),
        };

        if !gueltig {
            return PasswortPruefung::abgelehnt();
        }

        PasswortPruefung {
            gueltig: true,
            neu_hashen: self.braucht_neuen_hash(hash),
        }
    }

    /// Verbrennt eine Verifikation gegen einen Dummy-Hash
    ///
    /// Wird aufgerufen wenn kein Konto zur E-Mail existiert, damit der
    /// Ablehnungspfad gleich lange dauert wie eine echte Pruefung.
    pub fn blind_pruefen(&self, passwort: &str) {
        let _ = self.pruefen(passwort, &self.dummy_hash);
    }

    /// Meldet ob ein gueltiger Hash neu erzeugt werden sollte
    ///
    /// `true` wenn der Hash nicht vom bevorzugten Verfahren stammt oder
    /// dessen eingebettete Kostenparameter von der Konfiguration abweichen.
    fn braucht_neuen_hash(&self, hash: &str) -> bool {
        match self.bevorzugt() {
            HashVerfahren::Argon2id {
                m_cost,
                t_cost,
                p_cost,
            } => {
                if !hash.starts_with("$argon2id$") {
                    return true;
                }
                let Ok(geparst) = PasswordHash::new(hash) else {
                    return true;
                };
                match Params::try_from(&geparst) {
                    Ok(params) => {
                        params.m_cost() != m_cost
                            || params.t_cost() != t_cost
                            || params.p_cost() != p_cost
                    }
                    Err(_) => true,
                }
            }
            HashVerfahren::Bcrypt { cost } => {
                if !hash.starts_with("$2") {
                    return true;
                }
                bcrypt_cost(hash) != Some(cost)
            }
        }
    }
}

/// Baut eine Argon2id-Instanz mit den angegebenen Kostenparametern
fn argon2_instanz(m_cost: u32, t_cost: u32, p_cost: u32) -> AuthResult<Argon2<'static>> {
    let params = Params::new(m_cost, t_cost, p_cost, None)
        .map_err(|e| AuthError::Konfiguration(format!("Argon2-Parameter ungueltig: {e}")))?;
    Ok(Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params))
}

/// Verifiziert gegen einen PHC-Hash; Parameter kommen aus dem Hash selbst
fn argon2_verifizieren(passwort: &str, hash: &str) -> bool {
    let Ok(geparst) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(passwort.as_bytes(), &geparst)
        .is_ok()
}

/// Liest den Kostenfaktor aus einem bcrypt-Hash (`$2b$12$...`)
fn bcrypt_cost(hash: &str) -> Option<u32> {
    hash.split('$').nth(2)?.parse().ok()
}
