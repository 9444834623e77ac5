use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TenantValidationError {
    #[error("tenant id is missing")]
    Missing,
    #[error("invalid tenant id '{0}'")]
    InvalidTenantId(String),
}

pub fn validate_tenant_id_format(tenant_id: &str) -> Result<(), TenantValidationError> {
    if tenant_id.is_empty() {
        return Err(TenantValidationError::Missing);
    }

    if tenant_id.len() > 64 {
        return Err(TenantValidationError::InvalidTenantId(
            tenant_id.to_string(),
        ));
    }

    if !tenant_id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(TenantValidationError::InvalidTenantId(
            tenant_id.to_string(),
        ));
    }

    Ok(())
}
