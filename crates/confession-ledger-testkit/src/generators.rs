//! Proptest generators for property-based testing.

use proptest::prelude::*;

use confession_ledger_core::{Identity, KeccakHash, Keypair, Submission, SubmissionId};

/// Default category set used by generated submissions.
pub const CATEGORIES: &[&str] = &["confession", "secret", "regret", "gratitude", "other"];

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_filter_map("valid secp256k1 scalar", |secret| {
        Keypair::from_secret(&secret).ok()
    })
}

/// Generate a random Identity.
pub fn identity() -> impl Strategy<Value = Identity> {
    any::<[u8; 20]>().prop_map(Identity::from_bytes)
}

/// Generate a random KeccakHash.
pub fn keccak_hash() -> impl Strategy<Value = KeccakHash> {
    any::<[u8; 32]>().prop_map(KeccakHash::from_bytes)
}

/// Generate a random SubmissionId.
pub fn submission_id() -> impl Strategy<Value = SubmissionId> {
    any::<[u8; 32]>().prop_map(SubmissionId::from_bytes)
}

/// Generate a list of leaf hashes.
pub fn leaves(max: usize) -> impl Strategy<Value = Vec<KeccakHash>> {
    prop::collection::vec(keccak_hash(), 0..=max)
}

/// Generate a reasonable timestamp (Unix millis).
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=4_102_444_800_000i64
}

/// Generate non-blank content of at most `max_chars` characters.
pub fn content(max_chars: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(any::<char>(), 1..=max_chars.max(1))
        .prop_map(String::from_iter)
        .prop_filter("non-blank", |s| !s.trim().is_empty())
}

/// Generate an optional category from [`CATEGORIES`].
pub fn category() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::sample::select(CATEGORIES).prop_map(String::from))
}

/// Parameters for generating a submission.
#[derive(Debug, Clone)]
pub struct SubmissionParams {
    pub keypair: Keypair,
    pub content: String,
    pub category: Option<String>,
    pub created_at: i64,
}

impl Arbitrary for SubmissionParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (keypair(), content(200), category(), timestamp())
            .prop_map(|(keypair, content, category, created_at)| SubmissionParams {
                keypair,
                content,
                category,
                created_at,
            })
            .boxed()
    }
}

/// Generate a signed pending submission from parameters.
pub fn submission_from_params(params: &SubmissionParams) -> Submission {
    let signature = params
        .keypair
        .sign(params.content.as_bytes())
        .expect("signing with a valid key succeeds");
    Submission::new(
        params.keypair.identity(),
        params.content.clone(),
        signature,
        params.category.clone(),
        params.created_at,
    )
}
