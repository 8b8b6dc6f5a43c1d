use super::profile::ModelFamily;

/// Hard-coded capability defaults used when metadata says nothing.
///
/// Ratios are kept as the labels providers document (`21:9`, `16:10`); the
/// profiler canonicalizes them on the way into a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyPreset {
    pub aspect_ratios: &'static [&'static str],
    pub size_options: &'static [&'static str],
}

/// The ten ratios Gemini's `imageConfig.aspectRatio` accepts.
pub const GEMINI_ASPECT_RATIOS: &[&str] = &[
    "1:1", "2:3", "3:2", "3:4", "4:3", "4:5", "5:4", "9:16", "16:9", "21:9",
];

pub const OPENAI_IMAGE_SIZES: &[&str] = &["1024x1024", "1536x1024", "1024x1536"];

const SDXL_BUCKETS: &[&str] = &[
    "1024x1024", "1344x768", "768x1344", "1152x896", "896x1152", "1216x832", "832x1216",
];

pub fn family_preset(family: ModelFamily) -> Option<FamilyPreset> {
    let preset = match family {
        ModelFamily::GeminiImage => FamilyPreset {
            aspect_ratios: GEMINI_ASPECT_RATIOS,
            size_options: &["1K", "2K", "4K"],
        },
        ModelFamily::OpenAiImage => FamilyPreset {
            aspect_ratios: &["1:1", "3:2", "2:3", "16:9", "9:16"],
            size_options: OPENAI_IMAGE_SIZES,
        },
        ModelFamily::Flux => FamilyPreset {
            aspect_ratios: &["1:1", "16:9", "9:16", "4:3", "3:4", "3:2", "2:3", "21:9", "9:21"],
            size_options: &[],
        },
        ModelFamily::StableDiffusion => FamilyPreset {
            aspect_ratios: &["1:1", "16:9", "9:16", "4:3", "3:4", "3:2", "2:3"],
            size_options: SDXL_BUCKETS,
        },
        ModelFamily::Ideogram => FamilyPreset {
            aspect_ratios: &[
                "1:1", "16:9", "9:16", "4:3", "3:4", "3:2", "2:3", "16:10", "10:16", "3:1", "1:3",
            ],
            size_options: &[],
        },
        ModelFamily::Recraft => FamilyPreset {
            aspect_ratios: &["1:1", "4:3", "3:4", "3:2", "2:3", "16:9", "9:16"],
            size_options: &[
                "1024x1024", "1365x1024", "1024x1365", "1536x1024", "1024x1536", "1820x1024",
                "1024x1820",
            ],
        },
        ModelFamily::Seedream => FamilyPreset {
            aspect_ratios: &["1:1", "4:3", "3:4", "16:9", "9:16", "3:2", "2:3", "21:9"],
            size_options: &["1K", "2K", "4K"],
        },
        ModelFamily::QwenImage => FamilyPreset {
            aspect_ratios: &["1:1", "16:9", "9:16", "4:3", "3:4", "3:2", "2:3"],
            size_options: &[],
        },
        ModelFamily::HiDream => FamilyPreset {
            aspect_ratios: &["1:1", "16:9", "9:16", "4:3", "3:4", "3:2", "2:3"],
            size_options: &[
                "1024x1024", "1360x768", "768x1360", "1168x880", "880x1168", "1248x832",
                "832x1248",
            ],
        },
        ModelFamily::Imagen => FamilyPreset {
            aspect_ratios: &["1:1", "3:4", "4:3", "9:16", "16:9"],
            size_options: &["1K", "2K"],
        },
        ModelFamily::Midjourney => FamilyPreset {
            aspect_ratios: &["1:1", "16:9", "9:16", "4:3", "3:4", "3:2", "2:3", "21:9"],
            size_options: &[],
        },
        ModelFamily::Riverflow => FamilyPreset {
            aspect_ratios: &["1:1", "16:9", "9:16", "4:3", "3:4"],
            size_options: &[],
        },
        ModelFamily::MinimaxImage => FamilyPreset {
            aspect_ratios: &["1:1", "16:9", "4:3", "3:2", "2:3", "3:4", "9:16", "21:9"],
            size_options: &[],
        },
        ModelFamily::GenericImage => return None,
    };
    Some(preset)
}

#[cfg(test)]
mod tests {
    use crate::normalize::{normalize_aspect_ratio, normalize_size_token};

    use super::*;

    const FAMILIES: [ModelFamily; 14] = [
        ModelFamily::GeminiImage,
        ModelFamily::OpenAiImage,
        ModelFamily::MinimaxImage,
        ModelFamily::Flux,
        ModelFamily::StableDiffusion,
        ModelFamily::Ideogram,
        ModelFamily::Recraft,
        ModelFamily::Seedream,
        ModelFamily::QwenImage,
        ModelFamily::HiDream,
        ModelFamily::Imagen,
        ModelFamily::Midjourney,
        ModelFamily::Riverflow,
        ModelFamily::GenericImage,
    ];

    #[test]
    fn presets_normalize_without_losing_entries() {
        for family in FAMILIES {
            let Some(preset) = family_preset(family) else {
                assert_eq!(family, ModelFamily::GenericImage);
                continue;
            };
            assert!(!preset.aspect_ratios.is_empty(), "{family:?}");
            let mut canonical: Vec<String> = preset
                .aspect_ratios
                .iter()
                .map(|ratio| normalize_aspect_ratio(ratio))
                .collect();
            assert!(canonical.iter().all(|ratio| !ratio.is_empty()), "{family:?}");
            canonical.sort();
            canonical.dedup();
            assert_eq!(canonical.len(), preset.aspect_ratios.len(), "{family:?}");
            for size in preset.size_options {
                assert_eq!(&normalize_size_token(size), size, "{family:?}");
            }
        }
    }

    #[test]
    fn gemini_and_openai_presets_match_documented_shapes() {
        let gemini = family_preset(ModelFamily::GeminiImage).unwrap();
        assert_eq!(gemini.aspect_ratios.len(), 10);
        assert_eq!(gemini.size_options, &["1K", "2K", "4K"]);
        let openai = family_preset(ModelFamily::OpenAiImage).unwrap();
        assert_eq!(openai.aspect_ratios.len(), 5);
        assert_eq!(openai.size_options.len(), 3);
    }
}
