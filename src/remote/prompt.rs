// upscaler/src/remote/prompt.rs
//! Instruction text sent alongside the image.
//!
//! `instruction = template(tier).replace(FACTOR_PLACEHOLDER, factor) + goal_suffix(goal)`

use crate::core::{Goal, QualityTier, UpscaleFactor};

pub const FACTOR_PLACEHOLDER: &str = "{factor}";

const STANDARD_TEMPLATE: &str = "You are an expert image processing AI. Your task is to upscale the \
following image to {factor}x its original resolution. Focus on enhancing details, increasing \
sharpness, reducing compression artifacts, and improving overall clarity. Maintain photorealism \
and the original character of the image. Do not add any new elements or change the composition. \
Provide only the upscaled image as output.";

const PRO_TEMPLATE: &str = "You are a world-class image restoration engine. Upscale the following \
image to exactly {factor}x its original resolution by working through three passes. \
Pass 1, denoise: remove sensor noise, JPEG blocking and banding while keeping true edges intact. \
Pass 2, detail synthesis: reconstruct plausible fine structure (hair, fabric weave, foliage, \
skin pores, text strokes) at the new {factor}x scale, consistent with the content of the source. \
Pass 3, micro-contrast: restore local contrast and crisp edge definition without halos or \
oversharpening. Preserve the exact composition, colours, lighting and identity of every subject; \
never add, remove or move elements. Output a single photorealistic image at {factor}x resolution \
and nothing else.";

const DETAILS_SUFFIX: &str = " Prioritize reconstruction of high-frequency texture and fine \
detail, even where the source only hints at it.";

const SMOOTHNESS_SUFFIX: &str = " Prioritize clean, smooth surfaces: aggressively remove noise and \
compression artifacts, accepting a slight loss of fine detail.";

pub fn template(tier: QualityTier) -> &'static str {
    match tier {
        QualityTier::Standard => STANDARD_TEMPLATE,
        QualityTier::Pro => PRO_TEMPLATE,
    }
}

pub fn goal_suffix(goal: Goal) -> &'static str {
    match goal {
        Goal::Balanced => "",
        Goal::Details => DETAILS_SUFFIX,
        Goal::Smoothness => SMOOTHNESS_SUFFIX,
    }
}

pub fn build_instruction(tier: QualityTier, factor: UpscaleFactor, goal: Goal) -> String {
    let mut instruction = template(tier).replace(FACTOR_PLACEHOLDER, &factor.to_string());
    instruction.push_str(goal_suffix(goal));
    instruction
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_placeholder_is_substituted() {
        for tier in [QualityTier::Standard, QualityTier::Pro] {
            for factor in UpscaleFactor::ALL {
                let text = build_instruction(tier, factor, Goal::Balanced);
                assert!(!text.contains(FACTOR_PLACEHOLDER));
                let expected = template(tier).matches(FACTOR_PLACEHOLDER).count();
                assert_eq!(text.matches(&format!("{}x", factor)).count(), expected);
            }
        }
    }

    #[test]
    fn pro_template_repeats_the_factor() {
        assert!(template(QualityTier::Pro).matches(FACTOR_PLACEHOLDER).count() > 1);
    }

    #[test]
    fn goal_suffix_is_appended_verbatim() {
        let base = build_instruction(QualityTier::Standard, UpscaleFactor::X4, Goal::Balanced);
        let details = build_instruction(QualityTier::Standard, UpscaleFactor::X4, Goal::Details);
        let smooth = build_instruction(QualityTier::Standard, UpscaleFactor::X4, Goal::Smoothness);

        assert!(base.ends_with("Provide only the upscaled image as output."));
        assert_eq!(details, format!("{}{}", base, goal_suffix(Goal::Details)));
        assert_eq!(smooth, format!("{}{}", base, goal_suffix(Goal::Smoothness)));
        assert!(details.contains("high-frequency texture"));
        assert!(smooth.contains("remove noise"));
    }

    #[test]
    fn standard_instruction_names_the_factor() {
        let text = build_instruction(QualityTier::Standard, UpscaleFactor::X8, Goal::Balanced);
        assert!(text.contains("upscale the following image to 8x its original resolution"));
    }
}
