/*
 * review_properties.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Property-based tests for display conversion and the review cycle.
 *
 * Generated paragraphs mix plain text with additions and deletions. Each
 * change carries a unique token (`plusN` / `minusN`) that plain text can
 * never contain, so presence checks on the resolved HTML are exact.
 */

use proptest::prelude::*;
use smartdocs_core::editor::{EditorAdapter, MemoryEditor};
use smartdocs_core::normalize::normalize;
use smartdocs_core::reconciler::Reconciler;
use smartdocs_core::to_display_html;

#[derive(Debug, Clone)]
enum Segment {
    Plain(String),
    Addition { highlighted: bool, line_break: bool },
    Deletion,
}

fn gen_segment() -> impl Strategy<Value = Segment> {
    prop_oneof![
        "[a-z ]{0,10}".prop_map(Segment::Plain),
        (any::<bool>(), any::<bool>()).prop_map(|(highlighted, line_break)| Segment::Addition {
            highlighted,
            line_break
        }),
        Just(Segment::Deletion),
    ]
}

/// A generated proposal: the tagged markup plus the document it was made
/// against.
#[derive(Debug, Clone)]
struct Proposal {
    markup: String,
    original: String,
    kept_on_finalize: Vec<String>,
    kept_on_revert: Vec<String>,
    additions: usize,
    deletions: usize,
}

fn gen_proposal() -> impl Strategy<Value = Proposal> {
    prop::collection::vec(gen_segment(), 0..8).prop_map(|segments| {
        let mut markup = String::from("<p>");
        let mut original = String::from("<p>");
        let mut proposal = Proposal {
            markup: String::new(),
            original: String::new(),
            kept_on_finalize: Vec::new(),
            kept_on_revert: Vec::new(),
            additions: 0,
            deletions: 0,
        };

        for (i, segment) in segments.into_iter().enumerate() {
            match segment {
                Segment::Plain(text) => {
                    markup.push_str(&text);
                    original.push_str(&text);
                }
                Segment::Addition {
                    highlighted,
                    line_break,
                } => {
                    let token = format!("plus{i}");
                    let mut inner = if highlighted {
                        format!("<mark>{token}</mark>")
                    } else {
                        token
                    };
                    if line_break {
                        inner.push_str("\\nmore");
                    }
                    markup.push_str(&format!("<addition>{inner}</addition>"));
                    proposal.kept_on_finalize.push(inner.replace("\\n", "<br/>"));
                    proposal.additions += 1;
                }
                Segment::Deletion => {
                    let token = format!("minus{i}");
                    markup.push_str(&format!("<deletion>{token}</deletion>"));
                    original.push_str(&token);
                    proposal.kept_on_revert.push(token);
                    proposal.deletions += 1;
                }
            }
        }

        markup.push_str("</p>");
        original.push_str("</p>");
        proposal.markup = markup;
        proposal.original = original;
        proposal
    })
}

fn reconciler(html: &str) -> Reconciler<MemoryEditor> {
    Reconciler::new(EditorAdapter::new(MemoryEditor::with_content(html)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Display conversion leaves no review tags behind and is idempotent.
    #[test]
    fn test_display_conversion_reaches_fixed_point(proposal in gen_proposal()) {
        let once = to_display_html(&proposal.markup);
        prop_assert!(!once.contains("<addition"));
        prop_assert!(!once.contains("<deletion"));
        prop_assert!(!once.contains("\\n"));
        prop_assert_eq!(to_display_html(&once), once.clone());
    }

    /// Finalize keeps exactly the additions; revert keeps exactly the
    /// deletions. Nested markup in a kept change survives verbatim.
    #[test]
    fn test_finalize_and_revert_are_complements(proposal in gen_proposal()) {
        let mut accepted = reconciler(&proposal.original);
        let outcome = accepted.apply(&proposal.markup).unwrap();
        prop_assert_eq!(outcome.markers, proposal.additions + proposal.deletions);
        prop_assert_eq!(outcome.pending, proposal.additions + proposal.deletions > 0);

        let mut rejected = reconciler(&proposal.original);
        rejected.apply(&proposal.markup).unwrap();

        if outcome.pending {
            let finalized = accepted.finalize().unwrap();
            let reverted = rejected.revert().unwrap();

            for kept in &proposal.kept_on_finalize {
                prop_assert!(finalized.contains(kept.as_str()), "{} missing from {}", kept, finalized);
            }
            for dropped in &proposal.kept_on_revert {
                prop_assert!(!finalized.contains(dropped.as_str()));
                prop_assert!(reverted.contains(dropped.as_str()));
            }
            for dropped in &proposal.kept_on_finalize {
                prop_assert!(!reverted.contains(dropped.as_str()));
            }

            for html in [&finalized, &reverted] {
                prop_assert!(!html.contains("ai-addition"));
                prop_assert!(!html.contains("ai-deletion"));
            }
            prop_assert!(!accepted.has_pending_changes());
            prop_assert!(!rejected.has_pending_changes());
            prop_assert_eq!(normalize(&reverted), normalize(&proposal.original));
        }
    }

    /// Attribute order, inter-tag whitespace and editor noise never count as
    /// a change; text inside protected formatting always does.
    #[test]
    fn test_normalizer_equivalence(
        text in "[a-z]{1,10}",
        other in "[a-z]{1,10}",
        href in "[a-z]{1,8}",
        title in "[a-z]{1,8}",
        id in "[a-z0-9]{1,6}",
    ) {
        let plain = format!(
            r#"<p><a href="{href}" title="{title}">{text}</a></p><p><u>{text}</u></p><p><strong>{text}</strong></p>"#
        );
        let noisy = format!(
            "<p id=\"{id}\" contenteditable=\"true\">\n  <a title=\"{title}\" class=\"x{id}\" href=\"{href}\">{text}</a>\n</p>  <p>\n  <u>{text}</u>\n</p><p>  <strong class=\"s{id}\">{text}</strong>\n</p>"
        );
        prop_assert_eq!(normalize(&plain), normalize(&noisy));

        if other != text {
            let changed = format!(
                r#"<p><a href="{href}" title="{title}">{text}</a></p><p><u>{other}</u></p><p><strong>{text}</strong></p>"#
            );
            prop_assert_ne!(normalize(&plain), normalize(&changed));
        }
    }
}
