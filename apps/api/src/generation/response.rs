//! Response assembly: turns a pipeline run into the success envelope.
//! Failures never pass through here; `AppError::into_response` owns that shape.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::generation::pipeline::PipelineOutput;

/// Which optional parts of a run the success envelope carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseFields {
    pub content: bool,
    pub latex: bool,
    pub file_path: bool,
    pub pdf_data: bool,
}

impl Default for ResponseFields {
    fn default() -> Self {
        Self {
            content: true,
            latex: true,
            file_path: true,
            pdf_data: true,
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown response field '{0}'")]
pub struct UnknownResponseField(String);

impl FromStr for ResponseFields {
    type Err = UnknownResponseField;

    /// Parses a comma-separated list such as `content,filePath`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = ResponseFields {
            content: false,
            latex: false,
            file_path: false,
            pdf_data: false,
        };
        for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            match name {
                "content" => fields.content = true,
                "latex" => fields.latex = true,
                "filePath" => fields.file_path = true,
                "pdfData" => fields.pdf_data = true,
                other => return Err(UnknownResponseField(other.to_string())),
            }
        }
        Ok(fields)
    }
}

/// Success envelope. Absent fields are omitted from the JSON entirely.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResponse {
    pub request_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_data: Option<String>,
    /// Set when either stage substituted its placeholder.
    pub placeholder: bool,
    pub generated_at: DateTime<Utc>,
}

pub fn assemble_response(output: PipelineOutput, fields: ResponseFields) -> ExamResponse {
    let PipelineOutput {
        request_id,
        generated,
        formatted,
        artifact,
    } = output;

    ExamResponse {
        request_id,
        content: fields.content.then_some(generated.text),
        latex: fields.latex.then_some(formatted.markup),
        file_path: fields.file_path.then(|| artifact.public_locator.clone()),
        pdf_path: if fields.file_path {
            artifact.pdf_locator.clone()
        } else {
            None
        },
        pdf_data: if fields.pdf_data {
            artifact.rendered.as_ref().map(|pdf| pdf.data_uri())
        } else {
            None
        },
        placeholder: generated.placeholder || formatted.placeholder,
        generated_at: artifact.created_at,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::artifacts::{default_page_config, render_text_pdf, Artifact, ArtifactKey};
    use crate::generation::stages::{FormattedDocument, GeneratedContent};

    fn output(with_pdf: bool) -> PipelineOutput {
        let key = ArtifactKey::from_uuid(Uuid::nil());
        PipelineOutput {
            request_id: Uuid::nil(),
            generated: GeneratedContent {
                text: "1. Q".to_string(),
                placeholder: false,
            },
            formatted: FormattedDocument {
                markup: "\\item Q".to_string(),
                placeholder: true,
            },
            artifact: Artifact {
                public_locator: format!("/generatedTests/{key}/test.tex"),
                pdf_locator: with_pdf.then(|| format!("/generatedTests/{key}/test.pdf")),
                rendered: with_pdf
                    .then(|| render_text_pdf("\\item Q", &default_page_config()).unwrap()),
                source_path: PathBuf::from("public/generatedTests/x/test.tex"),
                key,
                created_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_all_fields() {
        let response = assemble_response(output(true), ResponseFields::default());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["content"], "1. Q");
        assert_eq!(json["latex"], "\\item Q");
        assert_eq!(
            json["filePath"],
            "/generatedTests/00000000000000000000000000000000/test.tex"
        );
        assert!(json["pdfPath"].as_str().unwrap().ends_with("test.pdf"));
        assert!(json["pdfData"]
            .as_str()
            .unwrap()
            .starts_with("data:application/pdf;base64,"));
        assert_eq!(json["placeholder"], true);
        assert!(json.get("generatedAt").is_some());
    }

    #[test]
    fn test_requested_subset_only() {
        let fields: ResponseFields = "content, filePath".parse().unwrap();
        let json = serde_json::to_value(assemble_response(output(true), fields)).unwrap();
        assert_eq!(json["content"], "1. Q");
        assert!(json.get("latex").is_none());
        assert!(json.get("pdfData").is_none());
        assert!(json.get("filePath").is_some());
    }

    #[test]
    fn test_pdf_fields_absent_when_not_rendered() {
        let json =
            serde_json::to_value(assemble_response(output(false), ResponseFields::default()))
                .unwrap();
        assert!(json.get("pdfData").is_none());
        assert!(json.get("pdfPath").is_none());
    }

    #[test]
    fn test_parse_fields_rejects_unknown() {
        assert!("content,answers".parse::<ResponseFields>().is_err());
        let none: ResponseFields = "".parse().unwrap();
        assert!(!none.content && !none.latex && !none.file_path && !none.pdf_data);
    }
}
