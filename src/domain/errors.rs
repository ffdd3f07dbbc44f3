use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("No encontrado: {0}")]
    NotFound(String),
    #[error("Entrada inválida: {0}")]
    InvalidInput(String),
    #[error("Error de operación: {0}")]
    OperationFailed(String),
    /// Fallo de red o de canal: la petición nunca obtuvo respuesta del servidor.
    #[error("Error de transporte: {0}")]
    Transport(String),
    /// El servidor respondió con `success: false`; el mensaje se muestra tal cual.
    #[error("{0}")]
    Rejected(String),
}

pub type DomainResult<T> = Result<T, DomainError>;
