use crate::error::FetchError;
use crate::upstream::{RawResponse, STATUS_ERROR, STATUS_SUCCESS};

/// Check that an upstream element has either the success or the error shape.
pub fn validate(resp: &RawResponse) -> Result<(), FetchError> {
    match resp.status.as_deref() {
        Some(STATUS_SUCCESS) if resp.random.is_none() => Err(FetchError::Malformed(
            "invalid message - missing random field".into(),
        )),
        Some(STATUS_ERROR) if resp.code.is_none() => Err(FetchError::Malformed(
            "invalid error message - missing code field".into(),
        )),
        Some(STATUS_SUCCESS) | Some(STATUS_ERROR) => Ok(()),
        _ => Err(FetchError::Malformed("invalid message - invalid status".into())),
    }
}
