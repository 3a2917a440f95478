//! Person upsert run after login.
//!
//! The identity provider's subject id keys an `identity` row that points at
//! a `person`. Logging in again bumps `last_login` instead of creating a
//! second person with the same e-mail.

use gqlauth_core::{GraphqlResponse, LinkError, LinkResult, Operation};
use gqlauth_oauth::IdentityClaims;
use serde::{Deserialize, Serialize};

/// Mutation creating or touching the identity and person rows.
pub const INSERT_IDENTITY: &str = r#"mutation insert_identity($given_name: String!, $family_name: String!, $email: String!, $external_id: String!) {
  insert_identity(
    objects: [
      {
        external_id: $external_id
        personByPerson: {
          data: { given_name: $given_name, family_name: $family_name, email: $email }
          on_conflict: { constraint: person_email_index, update_columns: [last_login] }
        }
      }
    ]
    on_conflict: { constraint: external_id_unique, update_columns: [external_id] }
  ) {
    affected_rows
    returning {
      id
      personByPerson {
        family_name
        given_name
        email
      }
    }
  }
}"#;

/// Variables of [`INSERT_IDENTITY`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityVariables {
    /// Subject id at the identity provider.
    pub external_id: String,
    /// Given name.
    pub given_name: Option<String>,
    /// Family name.
    pub family_name: Option<String>,
    /// E-mail address.
    pub email: Option<String>,
}

impl IdentityVariables {
    /// Take the values from decoded token claims as they are.
    pub fn from_claims(claims: &IdentityClaims) -> Self {
        Self {
            external_id: claims.sub.clone(),
            given_name: claims.given_name.clone(),
            family_name: claims.family_name.clone(),
            email: claims.email.clone(),
        }
    }

    /// Build the mutation operation.
    pub fn to_operation(&self) -> LinkResult<Operation> {
        Ok(Operation::new(INSERT_IDENTITY)
            .with_operation_name("insert_identity")
            .try_with_variables(self)?)
    }
}

/// The logged-in person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Given name.
    #[serde(default)]
    pub given_name: Option<String>,
    /// Family name.
    #[serde(default)]
    pub family_name: Option<String>,
    /// E-mail address.
    #[serde(default)]
    pub email: Option<String>,
}

/// Row id as returned by the API: integer or text (uuid) keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    /// Integer key.
    Int(i64),
    /// Text key.
    Text(String),
}

/// One element of `insert_identity.returning`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Identity row id.
    pub id: RecordId,
    /// Linked person.
    #[serde(rename = "personByPerson")]
    pub person: Person,
}

#[derive(Debug, Deserialize)]
struct InsertIdentityData {
    insert_identity: InsertIdentityResult,
}

#[derive(Debug, Deserialize)]
struct InsertIdentityResult {
    #[serde(default)]
    affected_rows: u64,
    #[serde(default)]
    returning: Vec<IdentityRecord>,
}

/// Extract the first returned identity from a mutation response.
pub fn parse_identity(response: &GraphqlResponse) -> LinkResult<IdentityRecord> {
    let data: InsertIdentityData = response.data_as()?;
    tracing::debug!(
        affected_rows = data.insert_identity.affected_rows,
        "Identity upserted"
    );
    data.insert_identity
        .returning
        .into_iter()
        .next()
        .ok_or_else(|| LinkError::protocol("insert_identity returned no rows"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn claims() -> IdentityClaims {
        serde_json::from_value(json!({
            "sub": "f3c1-77",
            "given_name": "Ada",
            "family_name": "Lovelace",
            "email": "Ada@Example.com",
            "preferred_username": "ada"
        }))
        .unwrap()
    }

    #[test]
    fn test_variables_copy_claims_unmodified() {
        let variables = IdentityVariables::from_claims(&claims());
        let operation = variables.to_operation().unwrap();

        assert_eq!(operation.operation_name.as_deref(), Some("insert_identity"));
        assert_eq!(
            operation.variables,
            json!({
                "external_id": "f3c1-77",
                "given_name": "Ada",
                "family_name": "Lovelace",
                "email": "Ada@Example.com"
            })
        );
        assert_eq!(operation.kind, gqlauth_core::OperationKind::Mutation);
    }

    #[test]
    fn test_parse_identity() {
        let response = GraphqlResponse::from_data(json!({
            "insert_identity": {
                "affected_rows": 2,
                "returning": [{
                    "id": 12,
                    "personByPerson": {
                        "family_name": "Lovelace",
                        "given_name": "Ada",
                        "email": "Ada@Example.com"
                    }
                }]
            }
        }));

        let record = parse_identity(&response).unwrap();
        assert_eq!(record.id, RecordId::Int(12));
        assert_eq!(
            record.person,
            Person {
                given_name: Some("Ada".into()),
                family_name: Some("Lovelace".into()),
                email: Some("Ada@Example.com".into()),
            }
        );
    }

    #[test]
    fn test_parse_identity_without_rows() {
        let response = GraphqlResponse::from_data(json!({
            "insert_identity": {"affected_rows": 0, "returning": []}
        }));
        assert!(matches!(
            parse_identity(&response),
            Err(LinkError::Protocol(_))
        ));
    }
}
