use time::OffsetDateTime;

const UNIX_TIME_UNIT_OFFSET: i128 = 1_000_000;

pub fn curr_time_millis() -> u64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / UNIX_TIME_UNIT_OFFSET) as u64
}

pub fn sleep_for_ms(ms: u64) {
    std::thread::sleep(std::time::Duration::from_millis(ms));
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn millis_monotone() {
        let t1 = curr_time_millis();
        sleep_for_ms(5);
        let t2 = curr_time_millis();
        assert!(t2 >= t1 + 5);
    }
}
