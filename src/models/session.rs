use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    #[serde(rename = "user")]
    Consumer,
    #[serde(rename = "company")]
    Company,
}

impl Role {
    /// Path segment the backend uses for this role's account endpoints.
    pub fn api_segment(self) -> &'static str {
        match self {
            Role::Consumer => "consumidores",
            Role::Company => "empresas",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Consumer => "user",
            Role::Company => "company",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::Consumer),
            "company" => Ok(Role::Company),
            _ => Err(anyhow::anyhow!("Unknown user type: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerIdentity {
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyIdentity {
    /// Id of the company's login account.
    pub id: i64,
    pub email: String,
    pub name: Option<String>,
    /// Id of the company record complaints are filed against.
    pub company_id: i64,
}

/// Who is logged in. The variant is the role; there is no separate role field
/// that could disagree with the identity shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Consumer(ConsumerIdentity),
    Company(CompanyIdentity),
}

impl Identity {
    pub fn role(&self) -> Role {
        match self {
            Identity::Consumer(_) => Role::Consumer,
            Identity::Company(_) => Role::Company,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            Identity::Consumer(c) => &c.email,
            Identity::Company(c) => &c.email,
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        match self {
            Identity::Consumer(c) => c.name.as_deref(),
            Identity::Company(c) => c.name.as_deref(),
        }
    }

    /// Build the identity from the user object the login/signup endpoints
    /// return. Returns `None` when no id or email can be derived.
    pub fn from_login_profile(role: Role, profile: &LoginProfile) -> Option<Self> {
        let account = profile.usuario.as_ref();
        let id = profile.display_id.or_else(|| account.map(|a| a.id))?;
        let email = profile
            .display_email
            .clone()
            .or_else(|| account.map(|a| a.email.clone()))
            .filter(|e| !e.is_empty())?;
        let name = profile
            .display_nome
            .clone()
            .or_else(|| account.and_then(|a| a.nome.clone()));

        match role {
            Role::Consumer => Some(Identity::Consumer(ConsumerIdentity { id, email, name })),
            Role::Company => Some(Identity::Company(CompanyIdentity {
                id,
                email,
                name,
                company_id: profile.id?,
            })),
        }
    }

    /// Snapshot stored under the `userInfo` key.
    pub fn to_stored(&self) -> StoredUserInfo {
        let (id, email, name) = match self {
            Identity::Consumer(c) => (c.id, &c.email, &c.name),
            Identity::Company(c) => (c.id, &c.email, &c.name),
        };
        StoredUserInfo {
            usuario: StoredAccount {
                id,
                email: email.clone(),
                nome: name.clone(),
            },
            company_id: match self {
                Identity::Company(c) => Some(c.company_id),
                Identity::Consumer(_) => None,
            },
        }
    }

    /// Rebuild an identity from a stored snapshot. A company snapshot without
    /// `companyId` is not a valid identity.
    pub fn from_stored(role: Role, stored: StoredUserInfo) -> Option<Self> {
        let StoredUserInfo { usuario, company_id } = stored;
        if usuario.email.is_empty() {
            return None;
        }
        match role {
            Role::Consumer => Some(Identity::Consumer(ConsumerIdentity {
                id: usuario.id,
                email: usuario.email,
                name: usuario.nome,
            })),
            Role::Company => Some(Identity::Company(CompanyIdentity {
                id: usuario.id,
                email: usuario.email,
                name: usuario.nome,
                company_id: company_id?,
            })),
        }
    }
}

/// An authenticated session. Token, role and identity only ever exist together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub identity: Identity,
}

impl Session {
    pub fn role(&self) -> Role {
        self.identity.role()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredAccount {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub nome: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredUserInfo {
    pub usuario: StoredAccount,
    #[serde(rename = "companyId", default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<i64>,
}

// Request/Response DTOs
#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// User object nested in login and signup responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginProfile {
    /// Company record id (company payloads only).
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub display_id: Option<i64>,
    #[serde(default)]
    pub display_email: Option<String>,
    #[serde(default)]
    pub display_nome: Option<String>,
    #[serde(default)]
    pub usuario: Option<LoginAccount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginAccount {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub nome: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    #[serde(default)]
    pub usuario_consumidor: Option<LoginProfile>,
    #[serde(default)]
    pub usuario_empresa: Option<LoginProfile>,
}

impl AuthResponse {
    pub fn profile_for(&self, role: Role) -> Option<&LoginProfile> {
        match role {
            Role::Consumer => self.usuario_consumidor.as_ref(),
            Role::Company => self.usuario_empresa.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsumerSignup {
    pub nome: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpf: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompanySignup {
    pub razao_social: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nome_social: Option<String>,
    pub cnpj: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub enum Registration {
    Consumer(ConsumerSignup),
    Company(CompanySignup),
}

impl Registration {
    pub fn role(&self) -> Role {
        match self {
            Registration::Consumer(_) => Role::Consumer,
            Registration::Company(_) => Role::Company,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_names() {
        assert_eq!(serde_json::to_string(&Role::Consumer).unwrap(), "\"user\"");
        assert_eq!("company".parse::<Role>().unwrap(), Role::Company);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_consumer_identity_prefers_display_fields() {
        let profile: LoginProfile = serde_json::from_value(serde_json::json!({
            "display_id": 7,
            "display_email": "ana@example.com",
            "display_nome": "Ana",
            "usuario": { "id": 99, "email": "old@example.com", "nome": "Old" }
        }))
        .unwrap();

        let identity = Identity::from_login_profile(Role::Consumer, &profile).unwrap();
        assert_eq!(
            identity,
            Identity::Consumer(ConsumerIdentity {
                id: 7,
                email: "ana@example.com".into(),
                name: Some("Ana".into()),
            })
        );
    }

    #[test]
    fn test_company_identity_falls_back_to_account() {
        let profile: LoginProfile = serde_json::from_value(serde_json::json!({
            "id": 12,
            "usuario": { "id": 3, "email": "sac@acme.com", "nome": "ACME" }
        }))
        .unwrap();

        let identity = Identity::from_login_profile(Role::Company, &profile).unwrap();
        match identity {
            Identity::Company(c) => {
                assert_eq!(c.id, 3);
                assert_eq!(c.company_id, 12);
                assert_eq!(c.email, "sac@acme.com");
            }
            Identity::Consumer(_) => panic!("expected company identity"),
        }
    }

    #[test]
    fn test_profile_without_email_is_rejected() {
        let profile: LoginProfile =
            serde_json::from_value(serde_json::json!({ "display_id": 1 })).unwrap();
        assert!(Identity::from_login_profile(Role::Consumer, &profile).is_none());
    }

    #[test]
    fn test_company_snapshot_requires_company_id() {
        let stored = StoredUserInfo {
            usuario: StoredAccount { id: 3, email: "sac@acme.com".into(), nome: None },
            company_id: None,
        };
        assert!(Identity::from_stored(Role::Company, stored.clone()).is_none());
        assert!(Identity::from_stored(Role::Consumer, stored).is_some());
    }

    #[test]
    fn test_stored_snapshot_shape() {
        let identity = Identity::Company(CompanyIdentity {
            id: 3,
            email: "sac@acme.com".into(),
            name: Some("ACME".into()),
            company_id: 12,
        });
        let value = serde_json::to_value(identity.to_stored()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "usuario": { "id": 3, "email": "sac@acme.com", "nome": "ACME" },
                "companyId": 12
            })
        );
    }
}
