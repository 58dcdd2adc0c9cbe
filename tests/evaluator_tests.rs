use consensus_engine::similarity::similarity;
use consensus_engine::{
    AnalysisDocument, CategoryWeights, ConsensusConfig, ConsensusEvaluator, ConsensusSession,
    Extractor, FinalState, HumanReviewReason, JsonExtractor, MarkdownExtractor, RoundController,
};

fn panel() -> Vec<AnalysisDocument> {
    let ex = MarkdownExtractor::new();
    vec![
        AnalysisDocument::from_text(
            "architect",
            1,
            "## Key Claims\n- The cache is consistent\n- Reads dominate\n\
             ## Risks\n- Stale reads after failover\n\
             ## Recommendations\n- Add TTLs",
            &ex,
        ),
        AnalysisDocument::from_text(
            "security",
            1,
            "**Claims**\n1. Reads dominate.\n\
             **Risks**\n1. Cache poisoning\n2. Stale reads after failover\n\
             **Recommendations**\n1. Add TTLs\n2. Sign cache entries",
            &ex,
        ),
        AnalysisDocument::from_text(
            "sre",
            1,
            "Claims:\n* Reads dominate\nRisks:\n* Stale reads after failover\nNext steps:\n* Add TTLs",
            &ex,
        ),
        AnalysisDocument::from_text("intern", 1, "Looks good to me!", &ex),
    ]
}

fn permutations(items: &[usize]) -> Vec<Vec<usize>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head);
            out.push(tail);
        }
    }
    out
}

#[test]
fn test_score_is_independent_of_document_order() {
    let docs = panel();
    let evaluator = ConsensusEvaluator::default();
    let baseline = evaluator.evaluate(&docs).unwrap();

    for order in permutations(&[0, 1, 2, 3]) {
        let shuffled: Vec<AnalysisDocument> = order.iter().map(|&i| docs[i].clone()).collect();
        let result = evaluator.evaluate(&shuffled).unwrap();
        assert_eq!(result.consensus_score.to_bits(), baseline.consensus_score.to_bits());
        assert_eq!(result.per_category_score, baseline.per_category_score);
        assert_eq!(result.agent_documents, baseline.agent_documents);
    }
}

#[test]
fn test_scores_stay_within_unit_interval() {
    let result = ConsensusEvaluator::default().evaluate(&panel()).unwrap();
    assert!((0.0..=1.0).contains(&result.consensus_score));
    for (_, score) in result.per_category_score.iter() {
        assert!((0.0..=1.0).contains(&score));
    }
    // The unstructured reply drags every category below full agreement.
    assert!(result.consensus_score < 0.5);
}

#[test]
fn test_similarity_is_symmetric() {
    let samples: Vec<Vec<&str>> = vec![
        vec![],
        vec!["A"],
        vec!["a.", "B"],
        vec!["b", "c", "d"],
        vec!["  ", "A"],
    ];
    for a in &samples {
        assert_eq!(similarity(a, a), 1.0);
        for b in &samples {
            assert_eq!(similarity(a, b), similarity(b, a));
        }
    }
}

#[test]
fn test_custom_weights_change_the_score() {
    let docs = panel()[..2].to_vec();
    let even = ConsensusEvaluator::default().evaluate(&docs).unwrap();
    let claims_only = ConsensusEvaluator::new(CategoryWeights {
        claims: 1.0,
        risks: 0.0,
        recommendations: 0.0,
    })
    .evaluate(&docs)
    .unwrap();

    assert_eq!(claims_only.consensus_score, claims_only.per_category_score.claims);
    assert_eq!(even.per_category_score, claims_only.per_category_score);
}

#[test]
fn test_markdown_and_json_replies_can_agree() {
    let markdown = MarkdownExtractor::new();
    let json = JsonExtractor::new();
    let text = r#"{"claims": ["Reads dominate"], "risks": ["Stale reads"], "recommendations": ["Add TTLs"]}"#;

    let docs = vec![
        AnalysisDocument::new("a1", 1, text, json.extract(text)),
        AnalysisDocument::from_text(
            "a2",
            1,
            "## Claims\n- reads dominate\n## Risks\n- stale reads\n## Recommendations\n- add ttls",
            &markdown,
        ),
    ];
    let result = ConsensusEvaluator::default().evaluate(&docs).unwrap();
    assert_eq!(result.consensus_score, 1.0);
}

#[test]
fn test_stagnation_trigger_scenario() {
    let controller = RoundController::new(ConsensusConfig::default());
    let decision = controller.decide(&[0.40, 0.60, 0.605]);
    assert_eq!(
        decision.state,
        FinalState::HumanReviewRequired(HumanReviewReason::Stagnation)
    );
}

#[test]
fn test_max_rounds_scenario() {
    let config = ConsensusConfig::default().with_max_rounds(3);
    let controller = RoundController::new(config);
    assert_eq!(
        controller.decide(&[0.5, 0.6, 0.65]).state,
        FinalState::MaxRoundsExhausted
    );
}

#[test]
fn test_session_from_scored_rounds() {
    let ex = MarkdownExtractor::new();
    let config = ConsensusConfig::default();
    let evaluator = ConsensusEvaluator::new(config.weights);
    let mut session = ConsensusSession::new("analyze", config).unwrap();

    for round in 1..=2 {
        let text = "## Claims\n- X\n- Y\n## Risks\n- Z\n## Recommendations\n- W";
        let docs = vec![
            AnalysisDocument::from_text("a1", round, text, &ex),
            AnalysisDocument::from_text("a2", round, text, &ex),
        ];
        let decision = session.record_round(evaluator.evaluate(&docs).unwrap()).unwrap();
        assert_eq!(decision.consensus_score, 1.0);
    }

    assert_eq!(session.final_state(), FinalState::ConsensusReached);
    let report = session.into_report();
    assert!(report.final_disagreement().unwrap().is_unanimous());
}
