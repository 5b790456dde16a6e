use clap::{Arg, Command};
use contact_gateway::controller::{
    ContactForm, Field, HttpSubmitter, Status, SubmitOutcome, DISMISS_DELAY,
};
use log::LevelFilter;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("test-submit")
        .about("Submit one contact form message to a running gateway")
        .arg(
            Arg::new("url")
                .long("url")
                .value_name("URL")
                .help("Gateway endpoint")
                .default_value("http://localhost:3000/api/send-email"),
        )
        .arg(
            Arg::new("name")
                .long("name")
                .value_name("NAME")
                .default_value("Test Sender"),
        )
        .arg(
            Arg::new("email")
                .long("email")
                .value_name("EMAIL")
                .default_value("test@example.com"),
        )
        .arg(
            Arg::new("message")
                .long("message")
                .value_name("TEXT")
                .default_value("Hello from test-submit"),
        )
        .arg(
            Arg::new("honeypot")
                .long("honeypot")
                .value_name("TEXT")
                .help("Fill the hidden field the way a bot would"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let value = |id: &str| matches.get_one::<String>(id).cloned().unwrap_or_default();

    let submitter = match HttpSubmitter::new(&value("url")) {
        Ok(submitter) => submitter,
        Err(e) => {
            eprintln!("❌ {e}");
            process::exit(1);
        }
    };

    let form = ContactForm::new(Arc::new(submitter));
    form.update_field(Field::Name, value("name"));
    form.update_field(Field::Email, value("email"));
    form.update_field(Field::Message, value("message"));
    form.update_field(Field::Honeypot, value("honeypot"));

    println!("📤 Submitting to {}", value("url"));
    match form.submit().await {
        SubmitOutcome::Blocked(field) => {
            eprintln!("❌ Form blocked by input constraints on {field:?}");
            process::exit(1);
        }
        SubmitOutcome::AlreadySubmitting => {
            eprintln!("❌ A submission is already in flight");
            process::exit(1);
        }
        SubmitOutcome::Finished(result) => println!("Result: {result:?}"),
    }

    match form.status() {
        Status::Success => println!("✅ Message sent successfully!"),
        Status::Error(message) => println!("❌ {message}"),
        Status::Idle => println!("Status: idle"),
    }

    tokio::time::sleep(DISMISS_DELAY).await;
    println!("Status after {}s: {:?}", DISMISS_DELAY.as_secs(), form.status());
}
