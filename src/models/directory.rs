use serde::{Deserialize, Serialize};

/// Paginated list envelope used by the backend's listing endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Company {
    pub display_id: i64,
    pub display_nome: String,
    pub razao_social: String,
    #[serde(default)]
    pub nome_social: Option<String>,
    #[serde(default)]
    pub descricao: Option<String>,
    pub cnpj: String,
    pub display_email: String,
    pub date_joined: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsumerProfile {
    pub display_id: i64,
    pub nome: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub date_joined: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileUpdate {
    pub nome: String,
    pub email: String,
    pub phone: String,
}
