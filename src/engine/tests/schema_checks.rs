use super::*;
use serde_json::json;

fn photo_schema() -> Schema {
    Schema::from_json_value(&json!({
        "": {
            "entityTypes": {
                "User": { "memberOfTypes": ["Group"] },
                "Group": {},
                "Photo": {}
            },
            "actions": {
                "view": {
                    "appliesTo": {
                        "principalTypes": ["User"],
                        "resourceTypes": ["Photo"]
                    }
                },
                "edit": {
                    "appliesTo": {
                        "principalTypes": ["User"],
                        "resourceTypes": ["Photo"]
                    }
                },
                "delete": {
                    "appliesTo": {
                        "principalTypes": ["User"],
                        "resourceTypes": ["Photo"]
                    }
                }
            }
        }
    }))
    .unwrap()
}

#[test]
fn test_unknown_action_raises_before_evaluation() {
    // A permit that would match is irrelevant: validation fails first
    // and no Decision is produced.
    let policies = store_from("permit(principal, action, resource);");
    let request = photo_request("alice", "wipe", "VacationPhoto94.jpg")
        .with_schema(photo_schema());

    let err = is_authorized(&request, &policies, None);
    assert!(matches!(err, Err(PolicyError::RequestValidationError(_))));
}

#[test]
fn test_known_action_evaluates_normally() {
    let policies = store_from(TEST_POLICY);
    let request = photo_request("alice", "view", "VacationPhoto94.jpg")
        .with_schema(photo_schema());
    assert_allow(&is_authorized(&request, &policies, None).unwrap());
}

#[test]
fn test_requests_without_schema_are_not_validated() {
    let policies = store_from(TEST_POLICY);
    let request = photo_request("alice", "wipe", "VacationPhoto94.jpg");
    // No schema attached: the unknown action is just an ordinary
    // non-match.
    assert_deny(&is_authorized(&request, &policies, None).unwrap());
}

#[test]
fn test_engine_level_schema() {
    let engine = PolicyEngine::new_from_str(TEST_POLICY)
        .unwrap()
        .with_schema(photo_schema());

    let ok = photo_request("alice", "view", "VacationPhoto94.jpg");
    assert_allow(&engine.evaluate(&ok).unwrap());

    let unknown = photo_request("alice", "wipe", "VacationPhoto94.jpg");
    assert!(matches!(
        engine.evaluate(&unknown),
        Err(PolicyError::RequestValidationError(_))
    ));
}

#[test]
fn test_validate_policies_reports_findings() {
    let schema = photo_schema();
    let mut policies = store_from(TEST_POLICY);
    policies
        .add_policy_str(
            "stray",
            r#"permit(principal == Robot::"r2", action == Action::"launch", resource);"#,
        )
        .unwrap();

    let findings = validate_policies(&policies, &schema).unwrap();
    assert_eq!(findings.len(), 2, "{findings:?}");
    assert!(findings.iter().all(|f| f.contains("stray")));
}

#[test]
fn test_validate_policies_clean_set() {
    let findings = validate_policies(&store_from(TEST_POLICY), &photo_schema()).unwrap();
    assert!(findings.is_empty(), "{findings:?}");
}
