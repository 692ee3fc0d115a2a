use std::collections::BTreeMap;

use super::*;
use crate::types::RequestContext;

mod authorize;
mod schema_checks;
mod templates;

const TEST_POLICY: &str = r#"
permit (
    principal == User::"alice",
    action in [Action::"view", Action::"edit", Action::"delete"],
    resource == Photo::"VacationPhoto94.jpg"
);

permit (
    principal == User::"bob",
    action == Action::"view",
    resource == Photo::"VacationPhoto94.jpg"
);
"#;

const TEST_POLICY_WITHOUT_BOB: &str = r#"
permit (
    principal == User::"alice",
    action in [Action::"view", Action::"edit", Action::"delete"],
    resource == Photo::"VacationPhoto94.jpg"
);
"#;

const TEST_POLICY_WITH_FORBID: &str = r#"
permit (
    principal == User::"alice",
    action in [Action::"view", Action::"edit", Action::"delete"],
    resource == Photo::"VacationPhoto94.jpg"
);
forbid (
    principal == User::"alice",
    action == Action::"edit",
    resource == Photo::"VacationPhoto94.jpg"
);
forbid (
    principal,
    action == Action::"delete",
    resource == Photo::"VacationPhoto94.jpg"
);
"#;

const TEST_POLICY_WITH_GROUPS: &str = r#"
permit (
    principal in Group::"admins",
    action,
    resource
);
"#;

fn store_from(text: &str) -> PolicySet {
    PolicySet::from_str(text).expect("policy document should parse")
}

fn photo_request(user: &str, action: &str, photo: &str) -> Request {
    Request::new(
        &format!(r#"User::"{user}""#),
        &format!(r#"Action::"{action}""#),
        &format!(r#"Photo::"{photo}""#),
    )
    .expect("request uids should be valid")
}

fn admins_store(members: &[&str]) -> EntityStore {
    let mut store = EntityStore::new();
    for member in members {
        store.add_entity(
            format!(r#"User::"{member}""#).parse().unwrap(),
            [],
            [r#"Group::"admins""#.parse().unwrap()],
        );
    }
    store
}

fn assert_allow(decision: &Decision) {
    assert_eq!(decision.outcome(), Outcome::Allow, "{decision}");
}

fn assert_deny(decision: &Decision) {
    assert_eq!(decision.outcome(), Outcome::Deny, "{decision}");
}
