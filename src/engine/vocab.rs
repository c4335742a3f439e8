//! Controlled vocabularies shared by both stores
//!
//! Every enumerated token accepted from callers or read back from a store is
//! parsed case-insensitively, with spaces, `_` and `-` treated as the same
//! separator, and rendered in one canonical spelling.

use std::fmt;
use thiserror::Error;

/// A token that is not part of a vocabulary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {vocabulary} '{token}' (expected one of: {expected})")]
pub struct UnknownToken {
    pub vocabulary: &'static str,
    pub token: String,
    pub expected: String,
}

/// Lowercase and collapse separators so "Likely_pathogenic" == "likely pathogenic"
pub fn normalize_token(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

macro_rules! vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident as $label:literal {
            $( $variant:ident => $token:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $( $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$( $name::$variant ),+];

            /// Canonical spelling
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $token ),+
                }
            }

            pub fn parse(raw: &str) -> Result<Self, $crate::engine::vocab::UnknownToken> {
                let wanted = $crate::engine::vocab::normalize_token(raw);
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| $crate::engine::vocab::normalize_token(v.as_str()) == wanted)
                    .ok_or_else(|| $crate::engine::vocab::UnknownToken {
                        vocabulary: $label,
                        token: raw.to_string(),
                        expected: Self::ALL
                            .iter()
                            .map(|v| v.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                    })
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::engine::vocab::UnknownToken;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S: ::serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D: ::serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).map_err(::serde::de::Error::custom)
            }
        }
    };
}

vocabulary! {
    /// Patient sex as recorded by the relational store
    Sex as "sex" {
        Male => "Male",
        Female => "Female",
        Other => "Other",
        Unknown => "Unknown",
    }
}

vocabulary! {
    SampleType as "sample type" {
        Blood => "Blood",
        Saliva => "Saliva",
        Tissue => "Tissue",
        Buccal => "Buccal",
        Other => "Other",
    }
}

vocabulary! {
    /// Lifecycle of a sample in the lab
    SampleStatus as "sample status" {
        Received => "Received",
        Processing => "Processing",
        Completed => "Completed",
        Failed => "Failed",
        Canceled => "Canceled",
    }
}

vocabulary! {
    TestType as "test type" {
        Wgs => "WGS",
        Wes => "WES",
        Panel => "Panel",
        Snp => "SNP",
        RnaSeq => "RNA-seq",
        Other => "Other",
    }
}

vocabulary! {
    TestResultStatus as "test result status" {
        Pending => "Pending",
        Preliminary => "Preliminary",
        Final => "Final",
        Amended => "Amended",
        Canceled => "Canceled",
        Failed => "Failed",
    }
}

vocabulary! {
    /// ACMG-style five-tier classification
    ClinicalSignificance as "clinical significance" {
        Pathogenic => "Pathogenic",
        LikelyPathogenic => "Likely Pathogenic",
        UncertainSignificance => "Uncertain Significance",
        LikelyBenign => "Likely Benign",
        Benign => "Benign",
    }
}

vocabulary! {
    VariantType as "variant type" {
        Snv => "SNV",
        Insertion => "Insertion",
        Deletion => "Deletion",
        Duplication => "Duplication",
        Cnv => "CNV",
        Indel => "Indel",
    }
}

/// Which of the two stores a value, error or reference belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Relational,
    Document,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Relational => write!(f, "relational"),
            StoreKind::Document => write!(f, "document"),
        }
    }
}
