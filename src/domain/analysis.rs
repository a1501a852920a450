//! Document analysis models.
//!
//! `DocumentAnalysis` is the only shape the HTTP layer ever returns. Raw
//! backend output goes through [`DocumentAnalysis::from_backend`] before it
//! is treated as one.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Lowest confidence the backend may report.
pub const MIN_CONFIDENCE: f64 = 0.0;
/// Highest confidence the backend may report.
pub const MAX_CONFIDENCE: f64 = 100.0;

/// Inbound analysis request.
///
/// Every field is optional at the decoding stage so that an absent
/// `documentContent` surfaces as a missing-input error rather than a
/// deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAnalysisRequest {
    #[serde(default)]
    pub document_content: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
}

/// Document category as classified by the model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    FinancialStatement,
    Contract,
    LegalDocument,
    TaxReturn,
    BusinessPlan,
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 6] = [
        Self::FinancialStatement,
        Self::Contract,
        Self::LegalDocument,
        Self::TaxReturn,
        Self::BusinessPlan,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FinancialStatement => "financial_statement",
            Self::Contract => "contract",
            Self::LegalDocument => "legal_document",
            Self::TaxReturn => "tax_return",
            Self::BusinessPlan => "business_plan",
            Self::Other => "other",
        }
    }
}

/// Structured risk/insight report for a single document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DocumentAnalysis {
    pub summary: String,
    pub key_findings: Vec<String>,
    pub risk_factors: Vec<String>,
    pub recommendations: Vec<String>,
    pub confidence: f64,
    pub document_type: DocumentType,
    pub critical_issues: Vec<String>,
}

/// Coarse confidence tier, matching the badge colours the front-end shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

/// Why a backend object was rejected.
#[derive(Debug, Error)]
pub enum SchemaViolation {
    #[error("response is not a JSON object")]
    NotAnObject,

    #[error("response does not match the analysis shape: {0}")]
    Shape(#[from] serde_json::Error),

    #[error("confidence {0} is outside [0, 100]")]
    ConfidenceOutOfRange(f64),
}

impl DocumentAnalysis {
    /// Validate a raw backend object.
    ///
    /// Rejects missing, unknown or mistyped fields, a `documentType` outside
    /// the closed set and a `confidence` outside `[0, 100]`.
    pub fn from_backend(value: Value) -> Result<Self, SchemaViolation> {
        // serde would also accept a positional array for a struct
        if !value.is_object() {
            return Err(SchemaViolation::NotAnObject);
        }

        let analysis: DocumentAnalysis = serde_json::from_value(value)?;

        if !analysis.confidence.is_finite()
            || analysis.confidence < MIN_CONFIDENCE
            || analysis.confidence > MAX_CONFIDENCE
        {
            return Err(SchemaViolation::ConfidenceOutOfRange(analysis.confidence));
        }

        Ok(analysis)
    }

    /// JSON Schema declared to the model backend.
    pub fn json_schema() -> Value {
        let string_list = |description: &str| {
            json!({
                "type": "array",
                "items": { "type": "string" },
                "description": description,
            })
        };

        let categories: Vec<&str> = DocumentType::ALL.iter().map(DocumentType::as_str).collect();

        json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "Brief summary of the document content",
                },
                "keyFindings": string_list("Important findings or highlights"),
                "riskFactors": string_list("Potential risks or concerns identified"),
                "recommendations": string_list("Recommended actions or next steps"),
                "confidence": {
                    "type": "number",
                    "minimum": MIN_CONFIDENCE,
                    "maximum": MAX_CONFIDENCE,
                    "description": "Confidence level of the analysis",
                },
                "documentType": {
                    "type": "string",
                    "enum": categories,
                },
                "criticalIssues": string_list("Critical issues that need immediate attention"),
            },
            "required": [
                "summary",
                "keyFindings",
                "riskFactors",
                "recommendations",
                "confidence",
                "documentType",
                "criticalIssues",
            ],
            "additionalProperties": false,
        })
    }

    pub fn confidence_level(&self) -> ConfidenceLevel {
        if self.confidence >= 80.0 {
            ConfidenceLevel::High
        } else if self.confidence >= 60.0 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// Response body for a successful analysis.
#[derive(Debug, Serialize)]
pub struct AnalyzeDocumentResponse {
    pub analysis: DocumentAnalysis,
}
