use loongshot::cli::{internal_error, is_internal, run};

fn main() {
    if let Err(e) = run() {
        if is_internal(&e) {
            // Show error chain if available
            let mut message = e.to_string();
            let mut source = e.source();
            if source.is_some() {
                message.push_str("\n\nCaused by:");
                let mut indent = 1;
                while let Some(err) = source {
                    message.push_str(&format!("\n{:indent$}  {}", "", err));
                    source = err.source();
                    indent += 1;
                }
            }
            internal_error(&message);
        } else {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
