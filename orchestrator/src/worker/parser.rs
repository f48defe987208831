use crate::output::WorkerResult;
use netbench_config::ParserKind;
use netbench_resultset::{
    Metadata,
    RawSample,
};

const PART_SEPARATOR: &str = "---";
const TIME_PREFIX: &str = "Time:";

/// What a parser extracted from the captured stdout of a process.
#[derive(Debug, Default)]
pub struct ParsedOutput {
    pub result: WorkerResult,
    pub raw: Vec<RawSample>,
    pub metadata: Metadata,
}

/// Parse the output of a finished process. `now` is used as the timestamp
/// of raw samples for output that carries no time of its own.
pub fn parse_output(kind: ParserKind, stdout: &str, now: f64) -> ParsedOutput {
    match kind {
        ParserKind::LastValue => last_value(stdout, now),
        ParserKind::Pairs => series(pairs(stdout)),
        ParserKind::Timestamped => series(timestamped(stdout)),
        ParserKind::Silent => ParsedOutput::default(),
    }
}

fn last_value(stdout: &str, now: f64) -> ParsedOutput {
    let Some(token) = stdout.split_whitespace().last() else {
        return ParsedOutput::default();
    };
    match token.parse::<f64>() {
        Ok(value) if value.is_finite() => ParsedOutput {
            result: WorkerResult::Scalar(value),
            raw: vec![RawSample::new(now, value)],
            metadata: Metadata::new(),
        },
        _ => {
            debug!("last output token '{token}' is not a number");
            ParsedOutput::default()
        }
    }
}

fn pairs(stdout: &str) -> Vec<(f64, f64)> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let time = tokens.next()?.trim_matches(['[', ']']).parse::<f64>().ok()?;
            let value = tokens.next()?.parse::<f64>().ok()?;
            (time.is_finite() && value.is_finite()).then_some((time, value))
        })
        .collect()
}

fn timestamped(stdout: &str) -> Vec<(f64, f64)> {
    let mut samples = Vec::new();
    let mut time = None;
    let mut value = None;
    for line in stdout.lines().map(str::trim).chain([PART_SEPARATOR]) {
        if line == PART_SEPARATOR {
            if let (Some(t), Some(v)) = (time.take(), value.take()) {
                samples.push((t, v));
            }
            time = None;
            value = None;
        } else if let Some(rest) = line.strip_prefix(TIME_PREFIX) {
            time = rest.trim().parse::<f64>().ok().filter(|t| t.is_finite());
        } else if value.is_none() {
            value = line.parse::<f64>().ok().filter(|v| v.is_finite());
        }
    }
    samples
}

fn series(samples: Vec<(f64, f64)>) -> ParsedOutput {
    if samples.is_empty() {
        return ParsedOutput::default();
    }
    let mut metadata = Metadata::new();
    let mean = samples.iter().map(|(_, v)| v).sum::<f64>() / samples.len() as f64;
    metadata.set("MEAN_VALUE", mean);
    ParsedOutput {
        raw: samples.iter().map(|&(t, v)| RawSample::new(t, v)).collect(),
        result: WorkerResult::Series(samples),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn samples(output: &ParsedOutput) -> &[(f64, f64)] {
        match &output.result {
            WorkerResult::Series(samples) => samples,
            other => panic!("expected a series, got {other:?}"),
        }
    }

    #[test]
    fn last_value_takes_the_final_token() {
        let output = parse_output(ParserKind::LastValue, "throughput: 12.5\n 941.3 \n", 10.0);
        assert!(matches!(output.result, WorkerResult::Scalar(v) if v == 941.3));
        assert_eq!(output.raw, vec![RawSample::new(10.0, 941.3)]);
    }

    #[test]
    fn last_value_rejects_garbage() {
        assert!(parse_output(ParserKind::LastValue, "done", 0.0).result.is_empty());
        assert!(parse_output(ParserKind::LastValue, "", 0.0).result.is_empty());
    }

    #[test]
    fn pairs_skip_noise_and_brackets() {
        let stdout = "PING example\n[1700000000.5] 12.0\n1700000001.0 13.5\nno reply\n";
        let output = parse_output(ParserKind::Pairs, stdout, 0.0);
        assert_eq!(samples(&output), &[(1_700_000_000.5, 12.0), (1_700_000_001.0, 13.5)]);
        assert_eq!(output.metadata.get_f64("MEAN_VALUE"), Some(12.75));
        assert_eq!(output.raw.len(), 2);
    }

    #[test]
    fn timestamped_parts() {
        let stdout = "Time: 100.5\n42\n---\nTime: 101.5\nnoise\n43\n---\nTime: 102.5\n---\n";
        let output = parse_output(ParserKind::Timestamped, stdout, 0.0);
        assert_eq!(samples(&output), &[(100.5, 42.0), (101.5, 43.0)]);
    }

    #[test]
    fn silent_yields_nothing() {
        let output = parse_output(ParserKind::Silent, "1 2 3", 0.0);
        assert!(output.result.is_empty());
        assert!(output.raw.is_empty());
    }
}
