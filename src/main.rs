use followup_quotes::FollowupError;

const EXIT_UNEXPECTED: i32 = 1;
const EXIT_DOMAIN: i32 = 2;

fn main() {
    if let Err(err) = followup_quotes::run() {
        if let Some(domain) = err.downcast_ref::<FollowupError>() {
            eprintln!("Error: {domain}");
            std::process::exit(EXIT_DOMAIN);
        }
        eprintln!("Error: unexpected failure: {err:#}");
        std::process::exit(EXIT_UNEXPECTED);
    }
}
