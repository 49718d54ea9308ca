/// Formats a race time in milliseconds as `m:ss.mmm`, or `ss.mmm` below a minute
pub fn format_race_time(millis: i32) -> String {
    let sign = if millis < 0 { "-" } else { "" };
    let millis = millis.unsigned_abs();

    let minutes = millis / 60_000;
    let seconds = (millis % 60_000) / 1_000;
    let rest = millis % 1_000;

    if minutes > 0 {
        format!("{}{}:{:02}.{:03}", sign, minutes, seconds, rest)
    } else {
        format!("{}{}.{:03}", sign, seconds, rest)
    }
}
