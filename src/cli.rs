use clap::{Arg, ArgAction, Command};
use log::debug;
use std::time::Instant;

pub fn build_cli() -> Command {
    debug!("⚙️ Building CLI interface...");
    let start_time = Instant::now();
    let cmd = Command::new("skincam")
        .version("0.1.0")
        .author("SkinCam Developers")
        .about("Live camera preview and still capture for skin lesion photos.")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Sets a custom configuration file")
                .action(ArgAction::Set)
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue)
        )
        .subcommand(
            Command::new("capture-image")
                .about("Opens the camera screen, takes still captures and saves them as JPEG")
                .arg(Arg::new("count").short('n').long("count").value_name("N").help("Number of stills to take (default: 1)").value_parser(clap::value_parser!(u32).range(1..)).action(ArgAction::Set))
                .arg(Arg::new("output").short('o').long("output").value_name("DIR").help("Output directory for pictures").action(ArgAction::Set))
                .arg(Arg::new("display-rotation").long("display-rotation").value_name("DEGREES").help("Display rotation to assume: 0, 90, 180 or 270").value_parser(clap::value_parser!(u32)).action(ArgAction::Set))
                .arg(Arg::new("permission").long("permission").value_name("POLICY").help("Camera permission answer: granted, denied or prompt").action(ArgAction::Set))
                .arg(Arg::new("preview-ms").long("preview-ms").value_name("MILLIS").help("How long to show the preview before each capture").value_parser(clap::value_parser!(u64)).action(ArgAction::Set))
        )
        .subcommand(
            Command::new("list-cameras")
                .about("Lists the cameras and preview sizes reported by the configured backend")
        )
        .subcommand(
            Command::new("test")
                .about("Runs a diagnostic test suite")
        );
    debug!("✅ CLI interface built in {:?}", start_time.elapsed());
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_image_arguments_parse() {
        let matches = build_cli()
            .try_get_matches_from([
                "skincam", "-d", "capture-image", "--count", "3", "--display-rotation", "90", "--permission", "denied",
            ])
            .unwrap();
        assert!(matches.get_flag("debug"));
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "capture-image");
        assert_eq!(sub.get_one::<u32>("count"), Some(&3));
        assert_eq!(sub.get_one::<u32>("display-rotation"), Some(&90));
        assert_eq!(sub.get_one::<String>("permission").map(String::as_str), Some("denied"));
    }

    #[test]
    fn zero_count_is_rejected() {
        assert!(build_cli()
            .try_get_matches_from(["skincam", "capture-image", "--count", "0"])
            .is_err());
    }
}
