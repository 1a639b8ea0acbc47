use coderag_core::{ChunkPreparer, Document};
use coderag_text::SparseIndex;

fn corpus() -> Vec<Document> {
	vec![
		Document::new("src/auth.py", "def reset_password(user, token):\n    verify(token)\n    user.password = None\n"),
		Document::new("src/billing.py", "def charge_card(card, amount):\n    gateway.charge(card, amount)\n"),
		Document::new("docs/README.md", "# Service\n\nHandles password resets and billing.\n"),
	]
}

fn index() -> SparseIndex {
	let prepared = ChunkPreparer::default().prepare(&corpus());
	SparseIndex::build(prepared.chunks).expect("build")
}

#[test]
fn ranks_keyword_matches_by_bm25() {
	let idx = index();
	assert_eq!(idx.len(), 3);
	let hits = idx.search_scored("reset password token", 10).expect("search");
	assert!(!hits.is_empty());
	assert_eq!(hits[0].1.source_path, "src/auth.py");
	for pair in hits.windows(2) {
		assert!(pair[0].0 >= pair[1].0);
	}
	assert!(hits.iter().all(|(_, c)| c.source_path != "src/billing.py"));
}

#[test]
fn matches_enriched_file_tags() {
	let hits = index().search("billing", 10).expect("search");
	let paths: Vec<&str> = hits.iter().map(|c| c.source_path.as_str()).collect();
	assert!(paths.contains(&"src/billing.py"), "{paths:?}");
	assert!(paths.contains(&"docs/README.md"), "{paths:?}");
}

#[test]
fn limits_to_k_and_ignores_stop_words() {
	let idx = index();
	assert_eq!(idx.search("password", 1).expect("search").len(), 1);
	assert!(idx.search("the and of", 5).expect("search").is_empty());
}
