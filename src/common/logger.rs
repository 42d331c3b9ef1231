use std::io::Write;
use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Installs an `env_logger` sink for the `log` facade.
///
/// Filtering follows `RUST_LOG` and defaults to `info`. Safe to call more than
/// once; only the first call has an effect.
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        let mut builder = env_logger::Builder::new();
        builder.format(|f, record| {
            writeln!(
                f,
                "{} {:<5} {} > {}",
                f.timestamp_micros(),
                record.level(),
                record.target(),
                record.args()
            )
        });

        if std::env::var_os("RUST_LOG").is_none() {
            builder.filter_level(log::LevelFilter::Info);
        }
        builder.parse_env("RUST_LOG");
        builder.is_test(cfg!(test));

        // Another logger may already be installed by the embedding program.
        let _ = builder.try_init();
    });
}
