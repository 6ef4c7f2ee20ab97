//! Translation of document-store failures into `AppError`.

use crate::docstore::DocError;
use crate::error::AppError;

impl From<DocError> for AppError {
    fn from(err: DocError) -> Self {
        let duplicate_index = match &err {
            DocError::DuplicateKey { index, .. } => Some(index.clone()),
            _ => None,
        };
        if let Some(field) = duplicate_index {
            return AppError::validation("constraint violation")
                .with_field(&field, "has already been taken")
                .with_source(err);
        }
        match err {
            DocError::DanglingReference { .. } => AppError::validation("constraint violation")
                .with_field("reference", "refers to a missing record")
                .with_source(err),
            DocError::WriteConflict { .. } => {
                AppError::validation("conflicting concurrent write; retry the operation")
                    .with_source(err)
            }
            _ => AppError::internal("storage failure").with_source(err),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::internal("document decoding failed").with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use crate::docstore::DocError;
    use crate::error::{AppError, ErrorKind};

    #[test]
    fn uniqueness_and_conflicts_are_validation_errors() {
        let duplicate: AppError = DocError::DuplicateKey {
            collection: "users".to_string(),
            index: "email".to_string(),
        }
        .into();
        assert_eq!(duplicate.kind(), ErrorKind::Validation);
        assert!(duplicate.fields().contains_key("email"));

        let conflict: AppError = DocError::WriteConflict {
            collection: "tags".to_string(),
        }
        .into();
        assert_eq!(conflict.kind(), ErrorKind::Validation);

        let dangling: AppError = DocError::DanglingReference {
            collection: "comments".to_string(),
            field: "article_id".to_string(),
        }
        .into();
        assert_eq!(dangling.kind(), ErrorKind::Validation);
        assert!(dangling.fields().contains_key("reference"));

        let other: AppError = DocError::UnknownCollection("x".to_string()).into();
        assert_eq!(other.kind(), ErrorKind::Internal);
    }
}
