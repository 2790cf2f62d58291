//! Dispatches a fetched event to its sink: stdout, colored by event type
//! (spec §4.7). START is blue, SUCCESS is green, FAILURE is red; any other
//! string is printed plain so an unrecognized or future event type never
//! causes a dispatch failure.

use colored::Colorize;

pub fn dispatch(event_type: &str, title: &str, message: &str) {
    let line = format!("[{event_type}] {title}: {message}");
    match event_type {
        "START" => println!("{}", line.blue()),
        "SUCCESS" => println!("{}", line.green()),
        "FAILURE" => println!("{}", line.red()),
        _ => println!("{line}"),
    }
}
