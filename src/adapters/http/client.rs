use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::application::dto::{
    AckResponse, DataResponse, SaveRuleConfigRequest, SetCurrentModelRequest, UploadResponse,
    UploadedFile, ValidationVerdict,
};
use crate::application::ports::ApiPort;
use crate::domain::{
    config::AppConfig,
    detection::DetectionItem,
    errors::{DomainError, DomainResult},
    model::ModelRecord,
    roi::{RoiConfig, RoiConfigMap},
    rules::{RuleConfig, RuleConfigMap},
};

fn transport(e: reqwest::Error) -> DomainError {
    DomainError::Transport(e.to_string())
}

/// Extrae el cuerpo esperado, o `Rejected` si el servidor devolvió
/// `{"error": ...}` en su lugar (los endpoints antiguos no llevan `success`).
fn expect_data<T: DeserializeOwned>(value: serde_json::Value) -> DomainResult<T> {
    if let Some(err) = value.get("error").and_then(|e| e.as_str()) {
        return Err(DomainError::Rejected(err.to_string()));
    }
    serde_json::from_value(value).map_err(|e| DomainError::OperationFailed(e.to_string()))
}

/// Cliente del contrato HTTP del servidor del dashboard.
pub struct HttpApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApiClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_value(&self, path: &str) -> DomainResult<serde_json::Value> {
        debug!("GET {path}");
        let res = self.client.get(self.url(path)).send().await.map_err(transport)?;
        res.json().await.map_err(transport)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> DomainResult<T> {
        debug!("POST {path}");
        let res = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        res.json().await.map_err(transport)
    }

    async fn post_multipart(
        &self,
        path: &str,
        filename: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> DomainResult<UploadResponse> {
        debug!("POST {path} (multipart, {} bytes)", bytes.len());
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime)
            .map_err(|e| DomainError::InvalidInput(e.to_string()))?;
        let form = Form::new().part("file", part);
        let res = self
            .client
            .post(self.url(path))
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        res.json().await.map_err(transport)
    }
}

#[async_trait]
impl ApiPort for HttpApiClient {
    async fn fetch_config(&self) -> DomainResult<AppConfig> {
        expect_data(self.get_value("/config.json").await?)
    }

    async fn upload_image(
        &self,
        filename: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> DomainResult<UploadedFile> {
        self.post_multipart("/upload", filename, mime, bytes)
            .await?
            .into_uploaded_file()
    }

    async fn list_models(&self) -> DomainResult<Vec<ModelRecord>> {
        expect_data(self.get_value("/api/models").await?)
    }

    async fn add_model(&self, model: &ModelRecord) -> DomainResult<()> {
        let ack: AckResponse = self.post_json("/api/models", model).await?;
        ack.into_message().map(|_| ())
    }

    async fn delete_model(&self, name: &str) -> DomainResult<()> {
        let path = format!("/api/models/{}", urlencoding::encode(name));
        debug!("DELETE {path}");
        let res = self
            .client
            .delete(self.url(&path))
            .send()
            .await
            .map_err(transport)?;
        let ack: AckResponse = res.json().await.map_err(transport)?;
        ack.into_message().map(|_| ())
    }

    async fn set_current_model(&self, name: &str) -> DomainResult<String> {
        let body = SetCurrentModelRequest {
            model_name: name.to_string(),
        };
        let ack: AckResponse = self.post_json("/api/models/current", &body).await?;
        ack.into_message()
    }

    async fn fetch_rule_configs(&self) -> DomainResult<RuleConfigMap> {
        let res: DataResponse<RuleConfigMap> =
            expect_data(self.get_value("/api/logic-rules").await?)?;
        res.into_data()
    }

    async fn save_rule_config(&self, name: &str, config: &RuleConfig) -> DomainResult<String> {
        let body = SaveRuleConfigRequest {
            rule_name: name.to_string(),
            roi_config: config.roi_config.clone(),
            model: config.model.clone(),
            rules: config.rules.clone(),
        };
        let ack: AckResponse = self.post_json("/api/logic-rules", &body).await?;
        ack.into_message()
    }

    async fn delete_rule_config(&self, name: &str) -> DomainResult<String> {
        debug!("DELETE /api/logic-rules?rule_name={name}");
        let res = self
            .client
            .delete(self.url("/api/logic-rules"))
            .query(&[("rule_name", name)])
            .send()
            .await
            .map_err(transport)?;
        let ack: AckResponse = res.json().await.map_err(transport)?;
        ack.into_message()
    }

    async fn validate_detection(
        &self,
        rule_name: &str,
        results: &[DetectionItem],
    ) -> DomainResult<ValidationVerdict> {
        debug!("POST /api/validate-detection?rule_name={rule_name}");
        // El cuerpo es el array de resultados tal cual, sin envoltorio.
        let res = self
            .client
            .post(self.url("/api/validate-detection"))
            .query(&[("rule_name", rule_name)])
            .json(results)
            .send()
            .await
            .map_err(transport)?;
        let ack: AckResponse = res.json().await.map_err(transport)?;
        // `success: false` aquí es un veredicto, no un fallo de la llamada.
        Ok(ValidationVerdict {
            passed: ack.success,
            message: ack.message.or(ack.error).unwrap_or_default(),
        })
    }

    async fn fetch_roi_configs(&self) -> DomainResult<RoiConfigMap> {
        expect_data(self.get_value("/api/roi-configs").await?)
    }

    async fn fetch_roi_config(&self, name: &str) -> DomainResult<RoiConfig> {
        let path = format!("/api/roi-config/{}", urlencoding::encode(name));
        let res: DataResponse<RoiConfig> = expect_data(self.get_value(&path).await?)?;
        res.into_data()
    }

    async fn save_roi_configs(&self, configs: &RoiConfigMap) -> DomainResult<()> {
        let ack: AckResponse = self.post_json("/api/roi-configs", configs).await?;
        ack.into_message().map(|_| ())
    }

    async fn delete_roi_config(&self, name: &str) -> DomainResult<()> {
        let path = format!("/api/roi-config/{}", urlencoding::encode(name));
        debug!("DELETE {path}");
        let res = self
            .client
            .delete(self.url(&path))
            .send()
            .await
            .map_err(transport)?;
        let ack: AckResponse = res.json().await.map_err(transport)?;
        ack.into_message().map(|_| ())
    }

    async fn upload_roi_background(
        &self,
        filename: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> DomainResult<String> {
        self.post_multipart("/api/upload-roi-background", filename, mime, bytes)
            .await?
            .into_background_url()
    }

    async fn fetch_image(&self, path: &str) -> DomainResult<Vec<u8>> {
        debug!("GET {path} (imagen)");
        let res = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(transport)?;
        if !res.status().is_success() {
            return Err(DomainError::NotFound(format!("Imagen {path}")));
        }
        let bytes = res.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expect_data_surfaces_error_payloads() {
        let value = serde_json::json!({"error": "无法读取配置文件"});
        let result: DomainResult<Vec<ModelRecord>> = expect_data(value);
        match result {
            Err(DomainError::Rejected(msg)) => assert_eq!(msg, "无法读取配置文件"),
            other => panic!("se esperaba Rejected: {other:?}"),
        }
    }

    #[test]
    fn expect_data_parses_plain_payloads() {
        let value = serde_json::json!([
            {"name": "coco", "type": "yolov8", "path": "models/coco.onnx"}
        ]);
        let models: Vec<ModelRecord> = expect_data(value).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "coco");
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = HttpApiClient::new("http://127.0.0.1:5000/");
        assert_eq!(client.url("/api/models"), "http://127.0.0.1:5000/api/models");
    }
}
