//! Phase 8: the word and stem indexes.
//!
//! Every description term is tokenised; each surviving word gets a flag
//! entry in WORDS, and its stem maps to the set of concepts whose
//! descriptions produce it. BTree maps keep both stores in ascending text
//! order, which is what makes the query-side binary searches work.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::lang::Language;
use crate::rf2::DescriptionRow;
use crate::store::{WORD_FLAG_FSN, WORD_FLAG_INACTIVE_ONLY};
use crate::{FSN_TYPE, tokenize};

use super::{CANCEL_STRIDE, Import, StemmerSet};

/// Build-side word flags; the active bit is inverted when persisted.
const SEEN_ACTIVE: u8 = 0x01;
const SEEN_FSN: u8 = 0x02;

pub(crate) fn process_words(
    import: &mut Import<'_>,
    desc_rows: &[(DescriptionRow, u32)],
) -> Result<usize> {
    let mut word_flags: BTreeMap<String, u8> = BTreeMap::new();
    let mut stem_concepts: BTreeMap<String, BTreeSet<u32>> = BTreeMap::new();
    let mut stemmers = StemmerSet::new();

    for (i, (row, offset)) in desc_rows.iter().enumerate() {
        if i % CANCEL_STRIDE == 0 {
            import.cancel.check("process words")?;
        }
        let concept_offset = import.descriptions.concept(*offset);
        let lang = Language::from_tag(&row.language).unwrap_or(Language::Other);
        let mut seen = 0u8;
        if row.active {
            seen |= SEEN_ACTIVE;
        }
        if row.type_id == FSN_TYPE {
            seen |= SEEN_FSN;
        }
        for word in tokenize(&row.term) {
            let stem = stemmers.stem(lang, &word);
            stem_concepts.entry(stem).or_default().insert(concept_offset);
            *word_flags.entry(word).or_insert(0) |= seen;
        }
    }

    // WORDS: ascending word order; the active bit inverts on disk.
    for (word, seen) in &word_flags {
        let mut flags = 0u8;
        if seen & SEEN_ACTIVE == 0 {
            flags |= WORD_FLAG_INACTIVE_ONLY;
        }
        if seen & SEEN_FSN != 0 {
            flags |= WORD_FLAG_FSN;
        }
        let term = import.strings.add(word);
        import.words.add(term, flags);
    }

    // STEMS: ascending stem order; the entry index is the stem id.
    let mut concept_stems: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for (stem_id, (stem, concepts)) in stem_concepts.iter().enumerate() {
        import.cancel.check("process words")?;
        let text = import.strings.add(stem);
        let sorted: Vec<u32> = concepts.iter().copied().collect();
        let refs = import.refs.add(&sorted);
        import.stems.add(text, refs);
        for &concept in concepts {
            concept_stems.entry(concept).or_default().push(stem_id as u32);
        }
    }

    // Per-concept stem-id lists; insertion order above is already ascending.
    for (concept_offset, stem_ids) in concept_stems {
        let refs = import.refs.add(&stem_ids);
        import.concepts.set_stems(concept_offset, refs);
    }

    Ok(word_flags.len())
}
