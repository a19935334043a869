use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ComplaintStatus {
    #[serde(rename = "ABERTA", alias = "Aberta")]
    Open,
    #[serde(rename = "ENCERRADA", alias = "Encerrada")]
    Closed,
}

impl std::fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ComplaintStatus::Open => "Aberta",
            ComplaintStatus::Closed => "Encerrada",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResolutionStatus {
    #[serde(rename = "EM_ANALISE", alias = "Em Análise", alias = "Em análise")]
    UnderReview,
    #[serde(rename = "RESOLVIDA", alias = "Resolvida")]
    Resolved,
    #[serde(rename = "NAO_RESOLVIDA", alias = "Não Resolvida")]
    Unresolved,
}

impl std::fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResolutionStatus::UnderReview => "Em Análise",
            ResolutionStatus::Resolved => "Resolvida",
            ResolutionStatus::Unresolved => "Não Resolvida",
        };
        write!(f, "{s}")
    }
}

/// The consumer's final verdict on a company response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Verdict {
    #[serde(rename = "RESOLVIDA")]
    Resolved,
    #[serde(rename = "NAO_RESOLVIDA")]
    Unresolved,
}

impl Verdict {
    pub fn resolution(self) -> ResolutionStatus {
        match self {
            Verdict::Resolved => ResolutionStatus::Resolved,
            Verdict::Unresolved => ResolutionStatus::Unresolved,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verdict::Resolved => "RESOLVIDA",
            Verdict::Unresolved => "NAO_RESOLVIDA",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplaintResponse {
    pub id: i64,
    #[serde(rename = "descricao")]
    pub description: String,
    #[serde(rename = "data_criacao")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "status_resolucao")]
    pub resolution_status: ResolutionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    #[serde(rename = "arquivo")]
    pub url: String,
    #[serde(rename = "nome_arquivo")]
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Complaint {
    pub id: i64,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "descricao")]
    pub description: String,
    pub status: ComplaintStatus,
    #[serde(rename = "data_criacao")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "usuario_consumidor", default)]
    pub consumer_id: Option<i64>,
    #[serde(rename = "usuario_consumidor_nome", default)]
    pub consumer_name: Option<String>,
    #[serde(rename = "empresa", default)]
    pub company_id: Option<i64>,
    #[serde(rename = "empresa_razao_social", default)]
    pub company_name: Option<String>,
    #[serde(rename = "resposta", default)]
    pub response: Option<ComplaintResponse>,
    #[serde(rename = "arquivos", default)]
    pub attachments: Vec<Attachment>,
}

// Request DTOs
#[derive(Debug, Serialize)]
pub struct RespondRequest<'a> {
    pub descricao: &'a str,
}

#[derive(Debug, Serialize)]
pub struct FinalizeRequest {
    pub status_resolucao: Verdict,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateComplaintRequest {
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "descricao")]
    pub description: String,
    #[serde(rename = "empresa")]
    pub company_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complaint_deserializes_backend_shape() {
        let complaint: Complaint = serde_json::from_value(serde_json::json!({
            "id": 42,
            "titulo": "Produto com defeito",
            "descricao": "Parou de funcionar",
            "status": "ABERTA",
            "data_criacao": "2025-06-10T14:03:22.123456-03:00",
            "usuario_consumidor_nome": "Ana",
            "empresa_razao_social": "ACME LTDA",
            "resposta": null
        }))
        .unwrap();

        assert_eq!(complaint.status, ComplaintStatus::Open);
        assert!(complaint.response.is_none());
        assert!(complaint.attachments.is_empty());
        assert_eq!(complaint.consumer_id, None);
    }

    #[test]
    fn test_display_labels_are_accepted() {
        let status: ComplaintStatus = serde_json::from_str("\"Encerrada\"").unwrap();
        assert_eq!(status, ComplaintStatus::Closed);
        let resolution: ResolutionStatus = serde_json::from_str("\"Não Resolvida\"").unwrap();
        assert_eq!(resolution, ResolutionStatus::Unresolved);
    }

    #[test]
    fn test_legacy_taxonomy_is_not_accepted() {
        assert!(serde_json::from_str::<ComplaintStatus>("\"Pendente\"").is_err());
    }

    #[test]
    fn test_finalize_body() {
        let body = serde_json::to_value(FinalizeRequest { status_resolucao: Verdict::Unresolved }).unwrap();
        assert_eq!(body, serde_json::json!({ "status_resolucao": "NAO_RESOLVIDA" }));
    }
}
