/// Runs the provided closure and logs how long it took, tagged with the
/// `$stage` name so that pipeline timings are easy to follow in the log.
/// Logs at debug level unless a `log::Level` is passed as third argument.
///
/// # Example
///
/// ```no run
/// # fn main {
///     let stretched = measure_time!("contrast stretch", || stretch_contrast(&gray));
///     measure_time!("merge", || merge_datasets(&config, &opts), log::Level::Info);
/// #}
#[macro_export]
macro_rules! measure_time {
    ($stage: expr, $fn: expr) => {
        $crate::measure_time!($stage, $fn, log::Level::Debug)
    };
    ($stage: expr, $fn: expr, $level: expr) => {{
        let instant = std::time::Instant::now();
        let res = $fn();
        log::log!(
            $level,
            "Finished \"{}\" in {} ms",
            $stage,
            instant.elapsed().as_millis(),
        );
        res
    }};
}
