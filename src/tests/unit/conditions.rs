use serde_json::json;

use crate::models::{DocumentStatus, TaskStatus};
use crate::tests::fixtures::test_env;
use crate::workflows::conditions::{evaluate, Condition, ConditionRule, ConditionType};

#[tokio::test]
async fn empty_and_matches_and_empty_or_does_not() {
    let env = test_env();
    let ctx = env.context().await;

    assert!(evaluate(&Condition::and(vec![]), &ctx).matched);
    assert!(!evaluate(&Condition::or(vec![]), &ctx).matched);
}

#[tokio::test]
async fn and_requires_every_child_and_or_any() {
    let env = test_env();
    let ctx = env.context().await;

    let hit = Condition::rule(
        ConditionRule::new(ConditionType::ClientStatusEquals).with_value(json!("ACTIVE")),
    );
    let miss = Condition::rule(
        ConditionRule::new(ConditionType::ClientStatusEquals).with_value(json!("SETTLED")),
    );

    assert!(!evaluate(&Condition::and(vec![hit.clone(), miss.clone()]), &ctx).matched);
    assert!(evaluate(&Condition::and(vec![hit.clone(), hit.clone()]), &ctx).matched);
    assert!(evaluate(&Condition::or(vec![miss.clone(), hit]), &ctx).matched);
    assert!(!evaluate(&Condition::or(vec![miss.clone(), miss]), &ctx).matched);
}

#[tokio::test]
async fn document_count_compares_against_threshold() {
    let env = test_env();
    for _ in 0..6 {
        env.seed_document("INCOME", DocumentStatus::Received);
    }
    let ctx = env.context().await;

    let rule = Condition::rule(
        ConditionRule::new(ConditionType::DocumentCount)
            .with_operator("gt")
            .with_value(json!(5)),
    );
    assert!(evaluate(&rule, &ctx).matched);

    // At exactly the threshold a strict gt no longer matches.
    let env = test_env();
    for _ in 0..5 {
        env.seed_document("INCOME", DocumentStatus::Received);
    }
    let ctx = env.context().await;
    assert!(!evaluate(&rule, &ctx).matched);
}

#[tokio::test]
async fn loan_amount_threshold_is_existential() {
    let env = test_env();
    env.seed_loan_scenario("conservative", 50_000);
    env.seed_loan_scenario("stretch", 150_000);
    let ctx = env.context().await;

    let rule = Condition::rule(
        ConditionRule::new(ConditionType::LoanAmountThreshold)
            .with_operator("gt")
            .with_value(json!(100000)),
    );
    let result = evaluate(&rule, &ctx);
    assert!(result.matched);
    assert!(result.detail.contains("stretch"));
}

#[tokio::test]
async fn missing_documents_checks_required_categories() {
    let env = test_env();
    env.seed_document("ID", DocumentStatus::Approved);
    env.seed_document("INCOME", DocumentStatus::Received);
    // BANK_STATEMENT requested but never supplied.
    env.seed_document("BANK_STATEMENT", DocumentStatus::Requested);
    let ctx = env.context().await;

    let rule = Condition::rule(ConditionRule::new(ConditionType::ClientMissingDocuments));
    assert!(evaluate(&rule, &ctx).matched);

    let env = test_env();
    env.seed_document("ID", DocumentStatus::Approved);
    env.seed_document("INCOME", DocumentStatus::Received);
    env.seed_document("BANK_STATEMENT", DocumentStatus::Received);
    let ctx = env.context().await;
    assert!(!evaluate(&rule, &ctx).matched);
}

#[tokio::test]
async fn overdue_task_rule_matches_existentially_without_operator() {
    let env = test_env();
    env.seed_task("stale", TaskStatus::Todo, Some(-3));
    let ctx = env.context().await;

    let rule = Condition::rule(ConditionRule::new(ConditionType::TaskOverdueExists));
    assert!(evaluate(&rule, &ctx).matched);

    let env = test_env();
    env.seed_task("done late", TaskStatus::Complete, Some(-3));
    let ctx = env.context().await;
    assert!(!evaluate(&rule, &ctx).matched);
}

#[tokio::test]
async fn malformed_rule_fails_closed_with_diagnostic() {
    let env = test_env();
    let ctx = env.context().await;

    // Count rule without an operator cannot be evaluated.
    let rule = Condition::rule(ConditionRule::new(ConditionType::DocumentCount));
    let result = evaluate(&rule, &ctx);
    assert!(!result.matched);
    assert!(result.detail.contains("operator"));

    let rule = Condition::rule(
        ConditionRule::new(ConditionType::TaskCount)
            .with_operator("between")
            .with_value(json!(2)),
    );
    let result = evaluate(&rule, &ctx);
    assert!(!result.matched);
    assert!(result.detail.contains("between"));
}

#[tokio::test]
async fn has_tag_checks_exact_tag() {
    let env = test_env();
    let ctx = env.context().await;

    let rule = |tag: &str| {
        Condition::rule(ConditionRule::new(ConditionType::ClientHasTag).with_value(json!(tag)))
    };
    assert!(evaluate(&rule("priority"), &ctx).matched);
    assert!(!evaluate(&rule("prio"), &ctx).matched);
}
