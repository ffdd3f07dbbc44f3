use serde::{Deserialize, Serialize};

use crate::domain::{
    detection::DetectionItem,
    errors::{DomainError, DomainResult},
    model::ModelRecord,
};

/// Respuesta de `POST /upload` y `POST /api/upload-roi-background`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub filepath: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Fichero aceptado por el servidor: ruta en disco y nombre final.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub filepath: String,
    pub filename: String,
}

impl UploadResponse {
    pub fn into_uploaded_file(self) -> DomainResult<UploadedFile> {
        if !self.success {
            return Err(DomainError::Rejected(
                self.error.unwrap_or_else(|| "Subida rechazada".to_string()),
            ));
        }
        match (self.filepath, self.filename) {
            (Some(filepath), Some(filename)) => Ok(UploadedFile { filepath, filename }),
            _ => Err(DomainError::OperationFailed(
                "Respuesta de subida incompleta".to_string(),
            )),
        }
    }

    pub fn into_background_url(self) -> DomainResult<String> {
        if !self.success {
            return Err(DomainError::Rejected(
                self.error.unwrap_or_else(|| "Subida rechazada".to_string()),
            ));
        }
        self.url.ok_or_else(|| {
            DomainError::OperationFailed("Respuesta de subida sin URL".to_string())
        })
    }
}

/// Respuesta genérica `{success, message?|error?}` de los endpoints de escritura.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AckResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AckResponse {
    /// Mensaje del servidor en caso de éxito; `Rejected` con el texto literal si no.
    pub fn into_message(self) -> DomainResult<String> {
        if self.success {
            Ok(self.message.unwrap_or_default())
        } else {
            let reason = self
                .error
                .or(self.message)
                .unwrap_or_else(|| "Operación rechazada".to_string());
            Err(DomainError::Rejected(reason))
        }
    }
}

/// Envoltorio `{success, data}` de `GET /api/logic-rules` y `GET /api/roi-config/{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> DataResponse<T> {
    pub fn into_data(self) -> DomainResult<T> {
        if !self.success {
            let reason = self
                .message
                .or(self.error)
                .unwrap_or_else(|| "Petición rechazada".to_string());
            return Err(DomainError::Rejected(reason));
        }
        self.data
            .ok_or_else(|| DomainError::OperationFailed("Respuesta sin datos".to_string()))
    }
}

/// Cuerpo de `POST /api/models/current`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCurrentModelRequest {
    pub model_name: String,
}

/// Cuerpo de `POST /api/logic-rules`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveRuleConfigRequest {
    pub rule_name: String,
    pub roi_config: String,
    pub model: String,
    pub rules: Vec<crate::domain::rules::LogicRule>,
}

/// Veredicto de `POST /api/validate-detection`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationVerdict {
    pub passed: bool,
    pub message: String,
}

/// Petición `detect` que el cliente emite por el canal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectRequest {
    pub image_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
}

/// Mensajes salientes del canal, etiquetados por `type` en el JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Detect(DetectRequest),
}

/// Mensajes que empuja el servidor por el canal, etiquetados por `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerPush {
    ModelLoaded {
        model: ModelRecord,
        #[serde(default)]
        message: Option<String>,
    },
    DetectionResults {
        #[serde(default)]
        success: bool,
        #[serde(default)]
        results: Vec<DetectionItem>,
        #[serde(default)]
        result_image: Option<String>,
        #[serde(default)]
        rule_name: Option<String>,
    },
    DetectionError {
        error: String,
    },
}

/// Evento entregado a los suscriptores del canal: transiciones de transporte
/// más los push del servidor.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Push(ServerPush),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_request_omits_missing_rule_name() {
        let msg = ClientMessage::Detect(DetectRequest {
            image_path: "/uploads/photo.jpg".to_string(),
            rule_name: None,
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "detect");
        assert_eq!(json["image_path"], "/uploads/photo.jpg");
        assert!(json.get("rule_name").is_none());
    }

    #[test]
    fn detect_request_carries_rule_name_when_present() {
        let msg = ClientMessage::Detect(DetectRequest {
            image_path: "/uploads/photo.jpg".to_string(),
            rule_name: Some("puerta".to_string()),
        });
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["rule_name"], "puerta");
    }

    #[test]
    fn server_push_parses_detection_results() {
        let json = r#"{
            "type": "detection_results",
            "success": true,
            "results": [{"class_name": "person", "score": 0.87}],
            "result_image": "/r.jpg"
        }"#;
        match serde_json::from_str::<ServerPush>(json).unwrap() {
            ServerPush::DetectionResults {
                success,
                results,
                result_image,
                rule_name,
            } => {
                assert!(success);
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].class_name, "person");
                assert_eq!(result_image.as_deref(), Some("/r.jpg"));
                assert_eq!(rule_name, None);
            }
            other => panic!("push inesperado: {other:?}"),
        }
    }

    #[test]
    fn ack_failure_surfaces_server_message_verbatim() {
        let ack = AckResponse {
            success: false,
            message: Some("模型名称已存在".to_string()),
            error: None,
        };
        match ack.into_message() {
            Err(DomainError::Rejected(msg)) => assert_eq!(msg, "模型名称已存在"),
            other => panic!("se esperaba Rejected: {other:?}"),
        }
    }

    #[test]
    fn upload_response_requires_both_paths() {
        let resp = UploadResponse {
            success: true,
            filepath: Some("/uploads/a.jpg".to_string()),
            filename: None,
            url: None,
            error: None,
        };
        assert!(resp.into_uploaded_file().is_err());
    }
}
