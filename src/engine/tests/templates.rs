use super::*;

const VIEW_TEMPLATE: &str = r#"
permit (
    principal == ?principal,
    action == Action::"view",
    resource == ?resource
);
"#;

fn slots(principal: &str, resource: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("principal".to_string(), principal.to_string()),
        ("resource".to_string(), resource.to_string()),
    ])
}

fn linked_store() -> PolicySet {
    let mut policies = PolicySet::new();
    policies
        .add_template(Template::new("view-template", VIEW_TEMPLATE).unwrap())
        .unwrap();
    policies
        .add_template_linked_policy(
            "alice-view-report",
            "view-template",
            &slots(r#"User::"alice""#, r#"Document::"report""#),
        )
        .unwrap();
    policies
}

#[test]
fn test_linked_policy_grants_exactly_the_substitution() {
    let policies = linked_store();

    let granted =
        Request::new(r#"User::"alice""#, r#"Action::"view""#, r#"Document::"report""#).unwrap();
    assert_allow(&is_authorized(&granted, &policies, None).unwrap());

    let other_doc =
        Request::new(r#"User::"alice""#, r#"Action::"view""#, r#"Document::"other-doc""#).unwrap();
    assert_deny(&is_authorized(&other_doc, &policies, None).unwrap());

    let other_user =
        Request::new(r#"User::"bob""#, r#"Action::"view""#, r#"Document::"report""#).unwrap();
    assert_deny(&is_authorized(&other_user, &policies, None).unwrap());

    let other_action =
        Request::new(r#"User::"alice""#, r#"Action::"edit""#, r#"Document::"report""#).unwrap();
    assert_deny(&is_authorized(&other_action, &policies, None).unwrap());
}

#[test]
fn test_unlinked_template_is_never_evaluated() {
    let mut policies = PolicySet::new();
    policies
        .add_template(Template::new("view-template", VIEW_TEMPLATE).unwrap())
        .unwrap();
    assert_eq!(policies.len(), 0);

    let request =
        Request::new(r#"User::"alice""#, r#"Action::"view""#, r#"Document::"report""#).unwrap();
    let decision = is_authorized(&request, &policies, None).unwrap();
    assert_deny(&decision);
    assert!(decision.diagnostics().is_empty());
}

#[test]
fn test_linking_is_deterministic() {
    // Linking the same template with the same values twice, under two
    // ids, yields policies that decide every request identically.
    let mut policies = linked_store();
    policies
        .add_template_linked_policy(
            "second-link",
            "view-template",
            &slots(r#"User::"alice""#, r#"Document::"report""#),
        )
        .unwrap();

    assert_eq!(
        policies.get_policy("alice-view-report"),
        policies.get_policy("second-link")
    );

    let requests = [
        (r#"User::"alice""#, r#"Action::"view""#, r#"Document::"report""#),
        (r#"User::"alice""#, r#"Action::"view""#, r#"Document::"other""#),
        (r#"User::"bob""#, r#"Action::"view""#, r#"Document::"report""#),
        (r#"User::"alice""#, r#"Action::"edit""#, r#"Document::"report""#),
    ];
    for (principal, action, resource) in requests {
        let request = Request::new(principal, action, resource).unwrap();
        let decision = is_authorized(&request, &policies, None).unwrap();
        let first_matched = decision.reasons().any(|id| id == "alice-view-report");
        let second_matched = decision.reasons().any(|id| id == "second-link");
        assert_eq!(first_matched, second_matched);
    }
}

#[test]
fn test_linked_policies_combine_with_forbids() {
    let mut policies = linked_store();
    policies
        .add_policy_str(
            "lockdown",
            r#"forbid(principal, action, resource == Document::"report");"#,
        )
        .unwrap();

    let request =
        Request::new(r#"User::"alice""#, r#"Action::"view""#, r#"Document::"report""#).unwrap();
    assert_deny(&is_authorized(&request, &policies, None).unwrap());
}

#[test]
fn test_hierarchy_template() {
    let mut policies = PolicySet::new();
    policies
        .add_template(
            Template::new(
                "team-access",
                r#"permit(principal in ?principal, action, resource in ?resource);"#,
            )
            .unwrap(),
        )
        .unwrap();
    policies
        .add_template_linked_policy(
            "devs-on-wiki",
            "team-access",
            &slots(r#"Group::"devs""#, r#"Space::"wiki""#),
        )
        .unwrap();

    let mut store = EntityStore::new();
    store.add_entity(
        r#"User::"alice""#.parse().unwrap(),
        [],
        [r#"Group::"devs""#.parse().unwrap()],
    );
    store.add_entity(
        r#"Page::"home""#.parse().unwrap(),
        [],
        [r#"Space::"wiki""#.parse().unwrap()],
    );

    let request =
        Request::new(r#"User::"alice""#, r#"Action::"view""#, r#"Page::"home""#).unwrap();
    assert_allow(&is_authorized(&request, &policies, Some(&store)).unwrap());

    let elsewhere =
        Request::new(r#"User::"alice""#, r#"Action::"view""#, r#"Page::"rogue""#).unwrap();
    assert_deny(&is_authorized(&elsewhere, &policies, Some(&store)).unwrap());
}
