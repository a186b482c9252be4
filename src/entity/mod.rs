use std::sync::atomic::{AtomicBool, Ordering};

pub mod extraction;

pub use extraction::{EntityExtractor, NerConfig};

pub const TARGET_ENTITY: &str = "entity";

pub const NER_MODEL_URL: &str =
    "https://huggingface.co/dslim/bert-base-NER/resolve/main/model.safetensors";
pub const NER_TOKENIZER_URL: &str =
    "https://huggingface.co/dslim/bert-base-NER/resolve/main/tokenizer.json";

// Set once when NER initialization fails; never cleared for the process
// lifetime, so a broken model is not retried on every run.
static NER_DISABLED: AtomicBool = AtomicBool::new(false);

pub fn ner_disabled() -> bool {
    NER_DISABLED.load(Ordering::Relaxed)
}

pub fn disable_ner() {
    NER_DISABLED.store(true, Ordering::Relaxed);
}
