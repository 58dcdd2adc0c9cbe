//! Benchmark to measure the cost of extracting and scoring one round.
//!
//! Scoring is quadratic in the number of agents, so this compares panel sizes.
//! Even large panels score in microseconds, far below a single LLM call.
//!
//! Run with: cargo bench --bench evaluator_bench

use consensus_engine::{AnalysisDocument, ConsensusEvaluator, Extractor, MarkdownExtractor};
use std::time::Instant;

fn agent_reply(agent: usize) -> String {
    let mut text = String::from("## Claims\n");
    for i in 0..12 {
        // Every agent shares the first half of its statements with the others.
        let owner = if i < 6 { 0 } else { agent };
        text.push_str(&format!("- Claim {} observed by agent {}\n", i, owner));
    }
    text.push_str("## Risks\n");
    for i in 0..8 {
        text.push_str(&format!("- Risk {} for component {}\n", i, i % 3 + agent % 2));
    }
    text.push_str("## Recommendations\n");
    for i in 0..6 {
        text.push_str(&format!("- Recommendation {}\n", i + agent % 4));
    }
    text
}

fn main() {
    let extractor = MarkdownExtractor::new();
    let evaluator = ConsensusEvaluator::default();
    let iterations = 2_000;

    println!("Consensus Evaluator Benchmark");
    println!("=============================\n");

    let replies: Vec<String> = (0..16).map(agent_reply).collect();

    let start = Instant::now();
    for _ in 0..iterations {
        for reply in &replies {
            let _extraction = extractor.extract(reply);
        }
    }
    let extraction = start.elapsed();
    println!(
        "Extraction: {:.2}µs per reply ({} bytes avg)\n",
        extraction.as_micros() as f64 / (iterations * replies.len()) as f64,
        replies.iter().map(|r| r.len()).sum::<usize>() / replies.len()
    );

    for agents in [2usize, 3, 5, 8, 16].iter().copied() {
        let documents: Vec<AnalysisDocument> = replies[..agents]
            .iter()
            .enumerate()
            .map(|(i, reply)| {
                AnalysisDocument::from_text(format!("agent-{}", i), 1, reply.as_str(), &extractor)
            })
            .collect();

        let start = Instant::now();
        let mut score = 0.0;
        for _ in 0..iterations {
            match evaluator.evaluate(&documents) {
                Ok(result) => score = result.consensus_score,
                Err(e) => {
                    eprintln!("evaluation failed: {}", e);
                    return;
                }
            }
        }
        let elapsed = start.elapsed();

        println!("{:>2} agents ({:>3} pairs):", agents, agents * (agents - 1) / 2);
        println!(
            "  Per round: {:.2}µs  (score {:.3})",
            elapsed.as_micros() as f64 / iterations as f64,
            score
        );
    }

    println!("\nContext: a single LLM call takes ~1,000,000µs+ (1+ seconds)");
}
