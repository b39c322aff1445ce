use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Payload for creating or fully replacing a test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTest {
    pub name: String,
    pub description: String,
}

impl NewTest {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    /// A uniquely named test created by `username`
    pub fn for_creation(username: &str) -> Self {
        Self::new(
            format!("API Test {}", Utc::now().timestamp_millis()),
            format!(
                "Checking the creation of a new test by {}. Endpoint: /api/tests/new",
                username
            ),
        )
    }

    /// Replacement values for a full update by `username`
    pub fn for_update(username: &str) -> Self {
        Self::new(
            format!("Updated API Test {}", Utc::now().timestamp_millis()),
            format!("Checking the update a test by {}.", username),
        )
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_payload() {
        let test = NewTest::for_creation("alice");
        let millis: i64 = test
            .name
            .strip_prefix("API Test ")
            .unwrap()
            .parse()
            .unwrap();
        assert!(millis > 0);
        assert_eq!(
            test.description,
            "Checking the creation of a new test by alice. Endpoint: /api/tests/new"
        );
    }

    #[test]
    fn test_update_payload_json() {
        let test = NewTest::for_update("bob");
        assert!(test.name.starts_with("Updated API Test "));

        let json = test.to_json();
        assert_eq!(json["description"], "Checking the update a test by bob.");
        assert_eq!(json.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_json_matches_struct_fields() {
        let test = NewTest::new("API Test 1", "desc");
        let json = test.to_json();
        assert_eq!(json, serde_json::to_value(&test).unwrap());

        let back: NewTest = serde_json::from_value(json).unwrap();
        assert_eq!(back, test);
    }
}
