fn main() {
    if let Err(err) = focusring_lib::run() {
        eprintln!("focusring: {err:?}");
        std::process::exit(1);
    }
}
