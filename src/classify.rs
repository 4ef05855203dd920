//! Classification of records into reporting tiers.
//!
//! Clinical significance text is bucketed by an ordered table of substring rules ([`CLINICAL_RULES`]).
//! The first matching rule wins, so the order of the table is part of its meaning.
//! Population frequencies are split into common and rare at [`COMMON_THRESHOLD`].
//!
//! The module also holds the immutable clinical gene reference table used by gene annotations.

use std::fmt;

use serde::Serialize;

//-----------------------------------------------------------------------------

/// Clinical significance bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClinicalBucket {
    /// Pathogenic.
    Pathogenic,
    /// Likely pathogenic.
    LikelyPathogenic,
    /// Benign.
    Benign,
    /// Likely benign.
    LikelyBenign,
    /// Uncertain significance.
    Uncertain,
    /// Conflicting interpretations.
    Conflicting,
    /// Anything else.
    Unclassified,
}

impl ClinicalBucket {
    /// All buckets in reporting order.
    pub const ALL: [ClinicalBucket; 7] = [
        ClinicalBucket::Pathogenic,
        ClinicalBucket::LikelyPathogenic,
        ClinicalBucket::Benign,
        ClinicalBucket::LikelyBenign,
        ClinicalBucket::Uncertain,
        ClinicalBucket::Conflicting,
        ClinicalBucket::Unclassified,
    ];

    /// Returns the reporting label of the bucket.
    pub fn label(&self) -> &'static str {
        match self {
            ClinicalBucket::Pathogenic => "pathogenic",
            ClinicalBucket::LikelyPathogenic => "likely_pathogenic",
            ClinicalBucket::Benign => "benign",
            ClinicalBucket::LikelyBenign => "likely_benign",
            ClinicalBucket::Uncertain => "VUS",
            ClinicalBucket::Conflicting => "conflicting",
            ClinicalBucket::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for ClinicalBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A classification rule: the lowercased text must contain one of `any_of` and none of `none_of`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClinicalRule {
    /// At least one of these substrings must be present.
    pub any_of: &'static [&'static str],
    /// None of these substrings may be present.
    pub none_of: &'static [&'static str],
    /// Bucket assigned on a match.
    pub bucket: ClinicalBucket,
}

impl ClinicalRule {
    /// Returns `true` if the lowercased text matches the rule.
    pub fn matches(&self, text: &str) -> bool {
        self.any_of.iter().any(|x| text.contains(x)) && !self.none_of.iter().any(|x| text.contains(x))
    }
}

/// Clinical significance rules in priority order.
///
/// `Pathogenic/Likely pathogenic` contains "likely", so it skips the first rule and lands in
/// [`ClinicalBucket::LikelyPathogenic`].
pub const CLINICAL_RULES: [ClinicalRule; 6] = [
    ClinicalRule { any_of: &["pathogenic"], none_of: &["likely"], bucket: ClinicalBucket::Pathogenic },
    ClinicalRule { any_of: &["likely pathogenic"], none_of: &[], bucket: ClinicalBucket::LikelyPathogenic },
    ClinicalRule { any_of: &["benign"], none_of: &["likely"], bucket: ClinicalBucket::Benign },
    ClinicalRule { any_of: &["likely benign"], none_of: &[], bucket: ClinicalBucket::LikelyBenign },
    ClinicalRule { any_of: &["uncertain", "vus"], none_of: &[], bucket: ClinicalBucket::Uncertain },
    ClinicalRule { any_of: &["conflicting"], none_of: &[], bucket: ClinicalBucket::Conflicting },
];

/// Returns the bucket of the first rule matching the case-insensitive text.
pub fn clinical_bucket(significance: &str) -> ClinicalBucket {
    let text = significance.to_lowercase();
    CLINICAL_RULES.iter()
        .find(|rule| rule.matches(&text))
        .map(|rule| rule.bucket)
        .unwrap_or(ClinicalBucket::Unclassified)
}

//-----------------------------------------------------------------------------

/// Allele frequencies strictly above this are common.
pub const COMMON_THRESHOLD: f64 = 0.01;

/// Returns `true` if the global allele frequency makes the variant common.
pub fn is_common(af: f64) -> bool {
    af > COMMON_THRESHOLD
}

//-----------------------------------------------------------------------------

/// Category of a clinically relevant gene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneCategory {
    /// Hereditary cancer.
    Cancer,
    /// Inherited cardiomyopathy.
    Cardiac,
    /// Drug response.
    Pharmacogenomic,
}

/// An entry in the clinical gene reference table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClinicalGene {
    /// Gene symbol.
    pub symbol: &'static str,
    /// Category.
    pub category: GeneCategory,
    /// Associated condition.
    pub condition: &'static str,
}

const HBOC: &str = "Hereditary breast and ovarian cancer syndrome";
const LYNCH: &str = "Lynch syndrome (hereditary nonpolyposis colorectal cancer)";
const HCM: &str = "Hypertrophic cardiomyopathy";
const HCM_DCM: &str = "Hypertrophic and dilated cardiomyopathy";

/// Clinically relevant genes and their associated conditions.
pub const CLINICAL_GENES: [ClinicalGene; 27] = [
    ClinicalGene { symbol: "BRCA1", category: GeneCategory::Cancer, condition: HBOC },
    ClinicalGene { symbol: "BRCA2", category: GeneCategory::Cancer, condition: HBOC },
    ClinicalGene { symbol: "MLH1", category: GeneCategory::Cancer, condition: LYNCH },
    ClinicalGene { symbol: "MSH2", category: GeneCategory::Cancer, condition: LYNCH },
    ClinicalGene { symbol: "MSH6", category: GeneCategory::Cancer, condition: LYNCH },
    ClinicalGene { symbol: "PMS2", category: GeneCategory::Cancer, condition: LYNCH },
    ClinicalGene { symbol: "APC", category: GeneCategory::Cancer, condition: "Familial adenomatous polyposis" },
    ClinicalGene { symbol: "TP53", category: GeneCategory::Cancer, condition: "Li-Fraumeni syndrome" },
    ClinicalGene { symbol: "VHL", category: GeneCategory::Cancer, condition: "Von Hippel-Lindau syndrome" },
    ClinicalGene { symbol: "RET", category: GeneCategory::Cancer, condition: "Multiple endocrine neoplasia type 2" },
    ClinicalGene { symbol: "PTEN", category: GeneCategory::Cancer, condition: "PTEN hamartoma tumor syndrome" },
    ClinicalGene { symbol: "MYBPC3", category: GeneCategory::Cardiac, condition: HCM },
    ClinicalGene { symbol: "MYH7", category: GeneCategory::Cardiac, condition: HCM_DCM },
    ClinicalGene { symbol: "TNNT2", category: GeneCategory::Cardiac, condition: HCM },
    ClinicalGene { symbol: "TNNI3", category: GeneCategory::Cardiac, condition: "Hypertrophic and restrictive cardiomyopathy" },
    ClinicalGene { symbol: "TPM1", category: GeneCategory::Cardiac, condition: HCM_DCM },
    ClinicalGene { symbol: "MYL2", category: GeneCategory::Cardiac, condition: HCM },
    ClinicalGene { symbol: "MYL3", category: GeneCategory::Cardiac, condition: HCM },
    ClinicalGene { symbol: "ACTC1", category: GeneCategory::Cardiac, condition: HCM_DCM },
    ClinicalGene { symbol: "CYP2D6", category: GeneCategory::Pharmacogenomic, condition: "Drug metabolism - antidepressants, antipsychotics" },
    ClinicalGene { symbol: "CYP2C19", category: GeneCategory::Pharmacogenomic, condition: "Drug metabolism - clopidogrel, proton pump inhibitors" },
    ClinicalGene { symbol: "CYP2C9", category: GeneCategory::Pharmacogenomic, condition: "Drug metabolism - warfarin, phenytoin" },
    ClinicalGene { symbol: "VKORC1", category: GeneCategory::Pharmacogenomic, condition: "Warfarin sensitivity" },
    ClinicalGene { symbol: "SLCO1B1", category: GeneCategory::Pharmacogenomic, condition: "Statin-induced myopathy" },
    ClinicalGene { symbol: "DPYD", category: GeneCategory::Pharmacogenomic, condition: "Fluoropyrimidine toxicity" },
    ClinicalGene { symbol: "TPMT", category: GeneCategory::Pharmacogenomic, condition: "Thiopurine toxicity" },
    ClinicalGene { symbol: "UGT1A1", category: GeneCategory::Pharmacogenomic, condition: "Irinotecan toxicity" },
];

/// Returns the reference table entry for the gene symbol.
pub fn clinical_gene(symbol: &str) -> Option<&'static ClinicalGene> {
    CLINICAL_GENES.iter().find(|gene| gene.symbol == symbol)
}

/// Returns `true` if the gene symbol is in the clinical gene table.
pub fn is_clinical_gene(symbol: &str) -> bool {
    clinical_gene(symbol).is_some()
}

//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_priority() {
        let cases = [
            ("Pathogenic", ClinicalBucket::Pathogenic),
            ("Likely_pathogenic", ClinicalBucket::Unclassified),
            ("Likely pathogenic", ClinicalBucket::LikelyPathogenic),
            ("Benign", ClinicalBucket::Benign),
            ("Likely benign", ClinicalBucket::LikelyBenign),
            ("Benign/Likely benign", ClinicalBucket::LikelyBenign),
            ("Uncertain significance", ClinicalBucket::Uncertain),
            ("VUS", ClinicalBucket::Uncertain),
            ("Conflicting interpretations of pathogenicity", ClinicalBucket::Pathogenic),
            ("Conflicting classifications", ClinicalBucket::Conflicting),
            ("not provided", ClinicalBucket::Unclassified),
            ("", ClinicalBucket::Unclassified),
        ];
        for (text, expected) in cases {
            assert_eq!(clinical_bucket(text), expected, "Wrong bucket for {:?}", text);
        }
    }

    #[test]
    fn pathogenic_likely_pathogenic() {
        assert_eq!(clinical_bucket("Pathogenic/Likely pathogenic"), ClinicalBucket::LikelyPathogenic);
        assert_eq!(clinical_bucket("PATHOGENIC/LIKELY PATHOGENIC"), ClinicalBucket::LikelyPathogenic);
    }

    #[test]
    fn common_threshold() {
        assert!(!is_common(0.01), "Frequency 0.01 should not be common");
        assert!(is_common(0.010001), "Frequency 0.010001 should be common");
        assert!(!is_common(0.0));
        assert!(is_common(1.0));
    }

    #[test]
    fn clinical_genes() {
        let gene = clinical_gene("BRCA1");
        assert!(gene.is_some(), "BRCA1 is not a clinical gene");
        let gene = gene.unwrap();
        assert_eq!(gene.category, GeneCategory::Cancer);
        assert_eq!(gene.condition, "Hereditary breast and ovarian cancer syndrome");
        assert_eq!(clinical_gene("VKORC1").map(|x| x.category), Some(GeneCategory::Pharmacogenomic));
        assert!(is_clinical_gene("MYH7"));
        assert!(!is_clinical_gene("brca1"), "Gene symbols are case-sensitive");
        assert!(!is_clinical_gene("DDX11L1"));

        for (i, gene) in CLINICAL_GENES.iter().enumerate() {
            assert!(CLINICAL_GENES[..i].iter().all(|x| x.symbol != gene.symbol), "Duplicate gene {}", gene.symbol);
        }
    }

    #[test]
    fn bucket_labels() {
        let labels: Vec<&str> = ClinicalBucket::ALL.iter().map(|x| x.label()).collect();
        assert_eq!(labels, vec!["pathogenic", "likely_pathogenic", "benign", "likely_benign", "VUS", "conflicting", "unclassified"]);
    }
}

//-----------------------------------------------------------------------------
