use yare::parameterized;

use super::*;

#[test]
fn test_default_deny_on_empty_store() {
    let policies = PolicySet::new();
    let request = photo_request("alice", "view", "VacationPhoto94.jpg");

    let decision = is_authorized(&request, &policies, None).unwrap();
    assert_deny(&decision);
    assert!(decision.diagnostics().is_empty());
    assert!(!bool::from(decision));
}

#[parameterized(
    alice_view_allow = { "alice", "view", "VacationPhoto94.jpg", Outcome::Allow },
    alice_edit_allow = { "alice", "edit", "VacationPhoto94.jpg", Outcome::Allow },
    alice_delete_allow = { "alice", "delete", "VacationPhoto94.jpg", Outcome::Allow },
    alice_view_wrong_photo_deny = { "alice", "view", "wrongphoto.jpg", Outcome::Deny },
    bob_view_allow = { "bob", "view", "VacationPhoto94.jpg", Outcome::Allow },
    bob_edit_deny = { "bob", "edit", "VacationPhoto94.jpg", Outcome::Deny },
    charlie_view_deny = { "charlie", "view", "VacationPhoto94.jpg", Outcome::Deny },
)]
fn test_evaluate_requests(user: &str, action: &str, photo: &str, expected: Outcome) {
    let policies = store_from(TEST_POLICY);
    let request = photo_request(user, action, photo);
    let decision = is_authorized(&request, &policies, None).unwrap();
    assert_eq!(decision.outcome(), expected);
}

#[parameterized(
    view_allowed = { "view", Outcome::Allow },
    edit_vetoed_by_forbid = { "edit", Outcome::Deny },
    delete_vetoed_for_anyone = { "delete", Outcome::Deny },
)]
fn test_deny_overrides(action: &str, expected: Outcome) {
    let policies = store_from(TEST_POLICY_WITH_FORBID);
    let request = photo_request("alice", action, "VacationPhoto94.jpg");
    let decision = is_authorized(&request, &policies, None).unwrap();
    assert_eq!(decision.outcome(), expected);
}

#[test]
fn test_deny_overrides_records_both_sides() {
    let policies = store_from(TEST_POLICY_WITH_FORBID);
    let request = photo_request("alice", "edit", "VacationPhoto94.jpg");

    let decision = is_authorized(&request, &policies, None).unwrap();
    assert_deny(&decision);

    // Both the matching permit and the matching forbid are recorded, in
    // evaluation order.
    let reasons: Vec<&str> = decision.reasons().collect();
    assert_eq!(reasons, vec!["policy0", "policy1"]);
    assert!(matches!(
        decision.diagnostics()[0],
        Diagnostic::Reason { effect: Effect::Permit, .. }
    ));
    assert!(matches!(
        decision.diagnostics()[1],
        Diagnostic::Reason { effect: Effect::Forbid, .. }
    ));
}

#[test]
fn test_non_matching_policies_not_recorded() {
    let policies = store_from(TEST_POLICY);
    let request = photo_request("bob", "view", "VacationPhoto94.jpg");

    let decision = is_authorized(&request, &policies, None).unwrap();
    assert_allow(&decision);
    let reasons: Vec<&str> = decision.reasons().collect();
    assert_eq!(reasons, vec!["policy1"]);
}

#[test]
fn test_group_membership_allows() {
    let policies = store_from(TEST_POLICY_WITH_GROUPS);
    let store = admins_store(&["alice"]);

    let alice = Request::new(r#"User::"alice""#, r#"Action::"delete""#, r#"Host::"any""#).unwrap();
    assert_allow(&is_authorized(&alice, &policies, Some(&store)).unwrap());

    // Bob is not in the graph at all.
    let bob = Request::new(r#"User::"bob""#, r#"Action::"delete""#, r#"Host::"any""#).unwrap();
    assert_deny(&is_authorized(&bob, &policies, Some(&store)).unwrap());
}

#[test]
fn test_hierarchy_monotonicity() {
    // B is a direct parent of A; an `in B` constraint covers both B
    // itself and A.
    let mut store = EntityStore::new();
    store.add_entity(
        r#"Group::"a""#.parse().unwrap(),
        [],
        [r#"Group::"b""#.parse().unwrap()],
    );
    assert!(
        store
            .ancestors(&r#"Group::"a""#.parse().unwrap())
            .contains(&r#"Group::"b""#.parse().unwrap())
    );

    let mut policies = PolicySet::new();
    policies
        .add_policy_str("p", r#"permit(principal in Group::"b", action, resource);"#)
        .unwrap();

    let as_b = Request::new(r#"Group::"b""#, r#"Action::"x""#, r#"Doc::"d""#).unwrap();
    assert_allow(&is_authorized(&as_b, &policies, Some(&store)).unwrap());

    let as_a = Request::new(r#"Group::"a""#, r#"Action::"x""#, r#"Doc::"d""#).unwrap();
    assert_allow(&is_authorized(&as_a, &policies, Some(&store)).unwrap());
}

#[test]
fn test_transitive_group_membership() {
    let mut store = EntityStore::new();
    store.add_entity(
        r#"User::"alice""#.parse().unwrap(),
        [],
        [r#"Group::"devs""#.parse().unwrap()],
    );
    store.add_entity(
        r#"Group::"devs""#.parse().unwrap(),
        [],
        [r#"Group::"staff""#.parse().unwrap()],
    );

    let mut policies = PolicySet::new();
    policies
        .add_policy_str("p", r#"permit(principal in Group::"staff", action, resource);"#)
        .unwrap();

    let request = Request::new(r#"User::"alice""#, r#"Action::"x""#, r#"Doc::"d""#).unwrap();
    assert_allow(&is_authorized(&request, &policies, Some(&store)).unwrap());
}

#[test]
fn test_cyclic_graph_still_decides() {
    let mut store = EntityStore::new();
    store.add_entity(
        r#"Group::"a""#.parse().unwrap(),
        [],
        [r#"Group::"b""#.parse().unwrap()],
    );
    store.add_entity(
        r#"Group::"b""#.parse().unwrap(),
        [],
        [r#"Group::"a""#.parse().unwrap()],
    );

    let mut policies = PolicySet::new();
    policies
        .add_policy_str("p", r#"permit(principal in Group::"b", action, resource);"#)
        .unwrap();

    let request = Request::new(r#"Group::"a""#, r#"Action::"x""#, r#"Doc::"d""#).unwrap();
    assert_allow(&is_authorized(&request, &policies, Some(&store)).unwrap());
    assert_eq!(store.detect_cycles().len(), 2);
}

#[test]
fn test_resource_hierarchy() {
    let mut store = EntityStore::new();
    store.add_entity(
        r#"Document::"report""#.parse().unwrap(),
        [],
        [r#"Folder::"finance""#.parse().unwrap()],
    );

    let mut policies = PolicySet::new();
    policies
        .add_policy_str(
            "p",
            r#"permit(principal, action, resource in Folder::"finance");"#,
        )
        .unwrap();

    let inside =
        Request::new(r#"User::"a""#, r#"Action::"view""#, r#"Document::"report""#).unwrap();
    assert_allow(&is_authorized(&inside, &policies, Some(&store)).unwrap());

    let outside =
        Request::new(r#"User::"a""#, r#"Action::"view""#, r#"Document::"memo""#).unwrap();
    assert_deny(&is_authorized(&outside, &policies, Some(&store)).unwrap());
}

#[test]
fn test_validate_policy_and_template() {
    assert!(validate_policy(r#"permit(principal, action, resource);"#).unwrap());
    assert!(validate_policy("permit(principal, action, resource").is_err());
    assert!(
        validate_template(r#"permit(principal == ?principal, action, resource);"#).unwrap()
    );
    assert!(validate_template(r#"permit(principal, action, resource);"#).is_err());
}
