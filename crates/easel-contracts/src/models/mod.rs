mod catalog;
mod family;
mod metadata;
mod presets;
mod profile;

pub use catalog::ModelCatalog;
pub use family::infer_family;
pub use metadata::{
    advertises_responses_endpoint, explicit_image_input, explicit_max_reference_images,
    extract_capabilities, ExtractedCapabilities,
};
pub use presets::{family_preset, FamilyPreset, GEMINI_ASPECT_RATIOS, OPENAI_IMAGE_SIZES};
pub use profile::{
    gemini_supports_image_size, max_reference_images, name_accepts_image_input, profile_metadata,
    profile_model, supports_image_input, ModelFamily, ModelRuntimeProfile, Transport,
};
