use crate::types::EntityId;

/// Domain errors shared across the portrait pipeline.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: EntityId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
