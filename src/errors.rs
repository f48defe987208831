use color_eyre::Result;

/// Install the error report and panic handlers. Debug builds get full
/// backtraces, release builds a crash report file.
pub fn init_errors() -> Result<()> {
    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default()
        .display_location_section(cfg!(debug_assertions))
        .into_hooks();
    eyre_hook.install()?;

    #[cfg(debug_assertions)]
    {
        let _ = panic_hook;
        better_panic::Settings::auto()
            .most_recent_first(false)
            .lineno_suffix(true)
            .install();
    }

    #[cfg(not(debug_assertions))]
    std::panic::set_hook(Box::new(move |panic_info| {
        eprintln!("{}", panic_hook.panic_report(panic_info));
        let metadata = human_panic::metadata!();
        if let Some(path) = human_panic::handle_dump(&metadata, panic_info) {
            human_panic::print_msg(Some(path), &metadata).ok();
        }
        std::process::exit(libc::EXIT_FAILURE);
    }));

    Ok(())
}
