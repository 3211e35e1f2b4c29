//! Iconic taxa, quality grades and the taxon tree lookup table

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Observation;

/// Iconic taxa accepted by the `taxon` filter, in the API's spelling
pub const FILTER_TAXA: [&str; 23] = [
    "Chromista",
    "Protozoa",
    "Animalia",
    "Mollusca",
    "Arachnida",
    "Insecta",
    "Aves",
    "Mammalia",
    "Amphibia",
    "Reptilia",
    "Actinopterygii",
    "Fungi",
    "Plantae",
    "Unknown",
    "Cnidaria",
    "Annelida",
    "Platyhelminthes",
    "Echinodermata",
    "Bryozoa",
    "Porifera",
    "Elasmobranchii",
    "Crustacea",
    "Ctenophora",
];

/// Coarse top-level biological category attached to an observation
///
/// The API identifies these by numeric id. Ids the client does not know
/// about map to [`IconicTaxon::Unknown`] instead of failing the record,
/// so new upstream taxa stay forward-compatible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconicTaxon {
    Life,
    Animalia,
    Actinopterygii,
    Aves,
    Reptilia,
    Amphibia,
    Mammalia,
    Arachnida,
    Insecta,
    Plantae,
    Fungi,
    Protozoa,
    Mollusca,
    Chromista,
    Cnidaria,
    Annelida,
    Platyhelminthes,
    Echinodermata,
    Bryozoa,
    Porifera,
    Elasmobranchii,
    Crustacea,
    Ctenophora,
    Unknown,
}

impl IconicTaxon {
    /// Map the API's `iconic_taxon_id` to a taxon
    pub fn from_id(id: i64) -> Self {
        match id {
            1 => Self::Life,
            2 => Self::Animalia,
            3 => Self::Actinopterygii,
            5 => Self::Aves,
            6 => Self::Reptilia,
            7 => Self::Amphibia,
            8 => Self::Mammalia,
            9 => Self::Arachnida,
            11 => Self::Insecta,
            12 => Self::Plantae,
            13 => Self::Fungi,
            14 => Self::Protozoa,
            15 => Self::Mollusca,
            16 => Self::Chromista,
            50 => Self::Cnidaria,
            51 => Self::Annelida,
            52 => Self::Platyhelminthes,
            53 => Self::Echinodermata,
            55 => Self::Bryozoa,
            56 => Self::Porifera,
            177 => Self::Elasmobranchii,
            240789 => Self::Crustacea,
            254021 => Self::Ctenophora,
            _ => Self::Unknown,
        }
    }

    /// Lowercase name, matching the API's record payloads
    pub fn name(&self) -> &'static str {
        match self {
            Self::Life => "life",
            Self::Animalia => "animalia",
            Self::Actinopterygii => "actinopterygii",
            Self::Aves => "aves",
            Self::Reptilia => "reptilia",
            Self::Amphibia => "amphibia",
            Self::Mammalia => "mammalia",
            Self::Arachnida => "arachnida",
            Self::Insecta => "insecta",
            Self::Plantae => "plantae",
            Self::Fungi => "fungi",
            Self::Protozoa => "protozoa",
            Self::Mollusca => "mollusca",
            Self::Chromista => "chromista",
            Self::Cnidaria => "cnidaria",
            Self::Annelida => "annelida",
            Self::Platyhelminthes => "platyhelminthes",
            Self::Echinodermata => "echinodermata",
            Self::Bryozoa => "bryozoa",
            Self::Porifera => "porifera",
            Self::Elasmobranchii => "elasmobranchii",
            Self::Crustacea => "crustacea",
            Self::Ctenophora => "ctenophora",
            Self::Unknown => "unknown",
        }
    }
}

/// Identification confidence tier assigned by the API
///
/// Unrecognized raw values map to [`QualityGrade::Unknown`] rather than
/// failing the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityGrade {
    Research,
    Casual,
    NeedsId,
    Unknown,
}

impl QualityGrade {
    /// Grade values accepted by the `grade` filter
    pub(crate) const FILTER_GRADES: [&'static str; 3] = ["research", "casual", "needs_id"];

    /// Parse a raw grade value from a record payload
    pub fn from_api(s: &str) -> Self {
        match s {
            "research" => Self::Research,
            "casual" => Self::Casual,
            "needs_id" => Self::NeedsId,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Casual => "casual",
            Self::NeedsId => "needs_id",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TaxonNode {
    id: i64,
    rank: String,
    name: String,
}

/// Lookup table from taxon id to rank and name
///
/// Built from the taxon tree CSV export (`id`, `rank`, `name` columns).
/// Used to turn an observation's `taxon_ancestry` id path into the
/// denormalized kingdom..genus columns.
#[derive(Debug, Default, Clone)]
pub struct TaxonTree {
    nodes: HashMap<i64, (String, String)>,
}

impl TaxonTree {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_csv(csv::Reader::from_path(path)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Self::from_csv(csv::Reader::from_reader(reader))
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let mut nodes = HashMap::new();
        for record in reader.deserialize() {
            let node: TaxonNode = record?;
            nodes.insert(node.id, (node.rank, node.name));
        }
        Ok(Self { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Rank and name of a taxon id, if the tree knows it
    pub fn get(&self, id: i64) -> Option<(&str, &str)> {
        self.nodes
            .get(&id)
            .map(|(rank, name)| (rank.as_str(), name.as_str()))
    }

    /// Fill the kingdom..genus columns of an observation from its ancestry
    ///
    /// Ancestry ids missing from the tree, and ranks outside the six
    /// denormalized levels, are skipped. Returns the observation unchanged
    /// when it carries no ancestry.
    pub fn annotate(&self, mut observation: Observation) -> Observation {
        let Some(ancestry) = observation.taxon_ancestry.clone() else {
            return observation;
        };
        for part in ancestry.split('/') {
            let Ok(id) = part.trim().parse::<i64>() else {
                continue;
            };
            // id 1 is the life root and carries no rank
            if id == 1 {
                continue;
            }
            let Some((rank, name)) = self.get(id) else {
                continue;
            };
            let slot = match rank {
                "kingdom" => &mut observation.kingdom,
                "phylum" => &mut observation.phylum,
                "class" => &mut observation.class,
                "order" => &mut observation.order,
                "family" => &mut observation.family,
                "genus" => &mut observation.genus,
                _ => continue,
            };
            *slot = Some(name.to_string());
        }
        observation
    }
}
