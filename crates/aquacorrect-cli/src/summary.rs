use aquacorrect_core::pipeline::config::CameraSettings;
use aquacorrect_core::pipeline::{CorrectionMethod, ParseSummary, ProcessSummary};
use console::Style;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    warning: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            warning: Style::new().yellow().bold(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

fn print_title(s: &Styles, title: &str) {
    println!();
    println!("  {}", s.title.apply_to(title));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(title.chars().count())));
    println!();
}

fn print_camera_section(s: &Styles, settings: &CameraSettings) {
    println!(
        "  {:<14}{}",
        s.label.apply_to("Camera"),
        s.value.apply_to(&settings.camera.name)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Sensor"),
        s.value.apply_to(format!(
            "{} {}x{}x{}",
            settings.layout,
            settings.camera.image_height,
            settings.camera.image_width,
            settings.camera.image_channels
        ))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Method"),
        s.method.apply_to(&settings.method)
    );
    if let CorrectionMethod::ColourCorrection(cc) = &settings.method {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Smoothing"),
            s.value.apply_to(cc.smoothing)
        );
        println!(
            "    {:<12}{}",
            s.label.apply_to("Altitude"),
            s.value.apply_to(format!(
                "{} - {} m",
                cc.altitude_filter.min_m, cc.altitude_filter.max_m
            ))
        );
        println!(
            "    {:<12}{}",
            s.label.apply_to("Target"),
            s.value
                .apply_to(format!("mean {} / std {}", cc.brightness, cc.contrast))
        );
    }
    println!();
}

pub fn print_parse_summary(summary: &ParseSummary, settings: &CameraSettings) {
    let s = Styles::new();
    print_title(&s, "Attenuation Parse");
    print_camera_section(&s, settings);

    println!("  {}", s.header.apply_to("Estimation"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Images"),
        s.value.apply_to(summary.images)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Admissible"),
        s.value.apply_to(summary.admissible)
    );
    if summary.bins == 0 {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Curve fit"),
            s.disabled.apply_to("not used")
        );
    } else {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Bins"),
            s.value.apply_to(summary.bins)
        );
        let fallbacks = format!("{} px", summary.fallbacks);
        if summary.fallbacks > 0 {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Fallbacks"),
                s.warning.apply_to(fallbacks)
            );
        } else {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Fallbacks"),
                s.value.apply_to(fallbacks)
            );
        }
    }
    println!();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Parameters"),
        s.path.apply_to(summary.parameters_dir.display())
    );
    println!();
}

pub fn print_process_summary(summary: &ProcessSummary, settings: &CameraSettings) {
    let s = Styles::new();
    print_title(&s, "Image Correction");
    print_camera_section(&s, settings);

    println!("  {}", s.header.apply_to("Output"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Images"),
        s.value.apply_to(summary.images)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Format"),
        s.value.apply_to(format!(
            "{} ({}-bit)",
            settings.output.format, settings.output.bit_depth
        ))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Debayer"),
        s.method.apply_to(settings.output.debayer)
    );
    if summary.undistorted {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Undistort"),
            s.method.apply_to("enabled")
        );
    } else {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Undistort"),
            s.disabled.apply_to("disabled")
        );
    }
    println!();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Directory"),
        s.path.apply_to(summary.output_dir.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Manifest"),
        s.path.apply_to(summary.manifest.display())
    );
    println!();
}
