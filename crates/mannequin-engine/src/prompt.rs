use mannequin_contracts::angles::AngleSpec;

const PERSONA: &str = "A high-quality studio photograph of a neutral grey plastic mannequin. \
Replicate the exact pose and body orientation of the person in the image. \
No hair, no clothes, no facial features. Smooth, matte surface.";

/// Instruction sent with the source photo for one angle.
pub fn build_prompt(angle: &AngleSpec, aspect_ratio: f64) -> String {
    format!(
        "{PERSONA}\n{}\nPlain white background. Crucially, the image must be in a {} {} aspect ratio.",
        angle.fragment.trim(),
        aspect_ratio_label(aspect_ratio),
        orientation(aspect_ratio),
    )
}

/// Width-to-height label such as `2:3` for a height/width ratio of 1.5.
pub fn aspect_ratio_label(height_over_width: f64) -> String {
    for width in 1u32..=16 {
        let height = height_over_width * f64::from(width);
        if (height - height.round()).abs() < 1e-6 && height.round() >= 1.0 {
            return format!("{}:{}", width, height.round() as u32);
        }
    }
    format!("1:{height_over_width:.3}")
}

fn orientation(height_over_width: f64) -> &'static str {
    if height_over_width > 1.0 {
        "vertical"
    } else if height_over_width < 1.0 {
        "horizontal"
    } else {
        "square"
    }
}
