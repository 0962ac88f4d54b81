/// Analysis layer: statistics over the filtered compound set.
///
/// ```text
///   RawDataset (after cumulative filter)
///        │
///        ├──► diversity   group → richness, Shannon H, Simpson, evenness
///        │
///        └──► overlap     exact group-membership cells (Venn partition)
/// ```

pub mod diversity;
pub mod overlap;
