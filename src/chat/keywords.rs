//! Canned answers selected by substring match

const GENIE_CIVIL_REPLY: &str = "The Génie Civil (Civil Engineering) department at the University of Annaba is where the EcoloBrick concept was born. We continue to work closely with their faculty to optimize the structural load-bearing capacity of our coffee and palm-based materials.";

/// A trigger substring and the reply it selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordRule {
    /// Lowercase substring
    pub trigger: &'static str,
    pub reply: &'static str,
}

/// Checked in order; the first trigger found wins.
pub const KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule {
        trigger: "crti",
        reply: "The Centre de Recherche en Technologies Industrielles (CRTI) is our strategic industrial partner in Algeria. They provide high-level technical certification, material testing, and validation services that ensure EcoloBrick products meet global construction standards.",
    },
    KeywordRule {
        trigger: "university of annaba",
        reply: "Our core scientific research is deeply integrated with the University of Annaba (Université Badji Mokhtar). This partnership allows us to collaborate with leading scientists on the molecular bonding of bio-composites.",
    },
    KeywordRule {
        trigger: "génie civil",
        reply: GENIE_CIVIL_REPLY,
    },
    KeywordRule {
        trigger: "genie civil",
        reply: GENIE_CIVIL_REPLY,
    },
    KeywordRule {
        trigger: "innovators",
        reply: "Our project is led by a brilliant team: Dr. Amri Naziha, Pr. Habachi Wafa, Dr. Benzerara Mohammed, Et. Mansouri Abderrahman, Et. Boumzaoute Zineddine, and Et. Lekouaght Abdelhamid. Each brings unique expertise from materials science to sustainable architecture.",
    },
];

/// Find the first rule whose trigger occurs in the lowercased message
pub fn match_keyword<'a>(rules: &'a [KeywordRule], message: &str) -> Option<&'a KeywordRule> {
    let normalized = message.to_lowercase();
    rules.iter().find(|rule| normalized.contains(rule.trigger))
}
