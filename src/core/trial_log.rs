use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::ExportError;
use crate::reward_path::RewardPath;
use crate::sequencer::Side;
use crate::transition::{TransitionKind, TransitionModel};

/// One attempted trial. Unobserved fields stay `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecord {
    /// Attempt index within the block, aborted attempts included.
    pub trial: u32,
    pub aborted: bool,
    pub stage1_choice: Option<usize>,
    pub stage1_key: Option<Side>,
    /// Seconds from stage onset to response.
    pub stage1_rt: Option<f64>,
    pub stage2_state: Option<usize>,
    pub transition: Option<TransitionKind>,
    pub stage2_choice: Option<usize>,
    pub stage2_key: Option<Side>,
    pub stage2_rt: Option<f64>,
    /// 1 if rewarded, 0 if not.
    pub reward: Option<u8>,
    /// Reward probabilities in effect during this trial.
    pub reward_probs: RewardPath,
}

impl TrialRecord {
    pub fn begin(trial: u32, reward_probs: RewardPath) -> Self {
        Self {
            trial,
            aborted: false,
            stage1_choice: None,
            stage1_key: None,
            stage1_rt: None,
            stage2_state: None,
            transition: None,
            stage2_choice: None,
            stage2_key: None,
            stage2_rt: None,
            reward: None,
            reward_probs,
        }
    }

    pub fn is_completed(&self) -> bool {
        !self.aborted && self.reward.is_some()
    }

    pub fn rewarded(&self) -> Option<bool> {
        self.reward.map(|r| r == 1)
    }
}

/// Ordered record of every attempt in a block.
#[derive(Debug, Clone, Default)]
pub struct TrialLog {
    records: Vec<TrialRecord>,
}

impl TrialLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: TrialRecord) {
        self.records.push(record);
    }

    /// The full ordered sequence, for hand-off to a writer.
    pub fn export(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&TrialRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn completed(&self) -> impl Iterator<Item = &TrialRecord> {
        self.records.iter().filter(|r| r.is_completed())
    }

    pub fn write_csv<W: Write>(&self, w: W, subject_id: &str, block: u32) -> Result<(), ExportError> {
        let mut wtr = csv::Writer::from_writer(w);
        for r in &self.records {
            wtr.serialize(RawRow::from_record(subject_id, block, r))?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Rebuilds a log from parsed rows, checking index ranges.
    pub fn from_rows(rows: &[RawRow]) -> Result<Self, ExportError> {
        let mut log = Self::new();
        for (i, row) in rows.iter().enumerate() {
            let record = row
                .to_record()
                .map_err(|message| ExportError::Malformed { row: i + 1, message })?;
            log.append(record);
        }
        Ok(log)
    }

    /// Consecutive pairs of completed trials, aborted attempts skipped.
    pub fn stay_rows(&self) -> Vec<StayObservation> {
        let done: Vec<&TrialRecord> = self.completed().collect();
        done.windows(2)
            .filter_map(|pair| {
                let (prev, cur) = (pair[0], pair[1]);
                Some(StayObservation {
                    stay: prev.stage1_choice? == cur.stage1_choice?,
                    last_transition: prev.transition?,
                    last_rewarded: prev.rewarded()?,
                    rt2: cur.stage2_rt,
                })
            })
            .collect()
    }

    pub fn stay_table(&self) -> StayTable {
        let mut table = StayTable::default();
        for obs in self.stay_rows() {
            table.add(&obs);
        }
        table
    }

    pub fn write_stay_csv<W: Write>(&self, w: W, subject_id: &str) -> Result<(), ExportError> {
        let mut wtr = csv::Writer::from_writer(w);
        for obs in self.stay_rows() {
            wtr.serialize(StayRow {
                subject_id: subject_id.to_string(),
                stay: obs.stay as u8,
                last_transition: obs.last_transition,
                last_rewarded: obs.last_rewarded as u8,
                rt2: obs.rt2,
            })?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Parses a raw trial CSV (header + rows).
pub fn read_csv<R: Read>(r: R) -> Result<Vec<RawRow>, ExportError> {
    let mut rdr = csv::Reader::from_reader(r);
    let mut rows = Vec::new();
    for row in rdr.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// One line of the raw CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub subject_id: String,
    pub block: u32,
    pub trial: u32,
    pub aborted: u8,
    pub a1: Option<usize>,
    pub a1_key: Option<Side>,
    pub rt1: Option<f64>,
    pub s2: Option<usize>,
    pub transition: Option<TransitionKind>,
    pub a2: Option<usize>,
    pub a2_key: Option<Side>,
    pub rt2: Option<f64>,
    pub r: Option<u8>,
    pub rprob_00: f64,
    pub rprob_01: f64,
    pub rprob_10: f64,
    pub rprob_11: f64,
}

impl RawRow {
    pub fn from_record(subject_id: &str, block: u32, r: &TrialRecord) -> Self {
        let p = r.reward_probs.flat();
        Self {
            subject_id: subject_id.to_string(),
            block,
            trial: r.trial,
            aborted: r.aborted as u8,
            a1: r.stage1_choice,
            a1_key: r.stage1_key,
            rt1: r.stage1_rt,
            s2: r.stage2_state,
            transition: r.transition,
            a2: r.stage2_choice,
            a2_key: r.stage2_key,
            rt2: r.stage2_rt,
            r: r.reward,
            rprob_00: p[0],
            rprob_01: p[1],
            rprob_10: p[2],
            rprob_11: p[3],
        }
    }

    pub fn to_record(&self) -> Result<TrialRecord, String> {
        let aborted = match self.aborted {
            0 => false,
            1 => true,
            v => return Err(format!("aborted must be 0 or 1, got {v}")),
        };
        for (name, v) in [("a1", self.a1), ("s2", self.s2), ("a2", self.a2)] {
            if let Some(v) = v {
                if v > 1 {
                    return Err(format!("{name} must be 0 or 1, got {v}"));
                }
            }
        }
        if let Some(r) = self.r {
            if r > 1 {
                return Err(format!("r must be 0 or 1, got {r}"));
            }
        }
        if let (Some(a1), Some(s2), Some(kind)) = (self.a1, self.s2, self.transition) {
            if TransitionModel::kind_of(a1, s2) != kind {
                return Err(format!("transition {kind:?} inconsistent with a1={a1}, s2={s2}"));
            }
        }

        Ok(TrialRecord {
            trial: self.trial,
            aborted,
            stage1_choice: self.a1,
            stage1_key: self.a1_key,
            stage1_rt: self.rt1,
            stage2_state: self.s2,
            transition: self.transition,
            stage2_choice: self.a2,
            stage2_key: self.a2_key,
            stage2_rt: self.rt2,
            reward: self.r,
            reward_probs: RewardPath::from_flat([
                self.rprob_00,
                self.rprob_01,
                self.rprob_10,
                self.rprob_11,
            ]),
        })
    }
}

/// Whether the first-stage choice was repeated, given the previous trial.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StayObservation {
    pub stay: bool,
    pub last_transition: TransitionKind,
    pub last_rewarded: bool,
    pub rt2: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StayRow {
    pub subject_id: String,
    pub stay: u8,
    pub last_transition: TransitionKind,
    pub last_rewarded: u8,
    pub rt2: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StayCell {
    pub stays: u32,
    pub total: u32,
}

impl StayCell {
    pub fn probability(&self) -> Option<f64> {
        (self.total > 0).then(|| self.stays as f64 / self.total as f64)
    }
}

/// Stay counts indexed `[previous rewarded][previous transition]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StayTable {
    cells: [[StayCell; 2]; 2],
}

impl StayTable {
    pub fn add(&mut self, obs: &StayObservation) {
        let cell = &mut self.cells[obs.last_rewarded as usize][obs.last_transition.index()];
        cell.total += 1;
        if obs.stay {
            cell.stays += 1;
        }
    }

    pub fn cell(&self, rewarded: bool, transition: TransitionKind) -> StayCell {
        self.cells[rewarded as usize][transition.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probs() -> RewardPath {
        RewardPath::from_flat([0.25, 0.5, 0.625, 0.75])
    }

    fn completed(trial: u32, a1: usize, s2: usize, a2: usize, reward: u8) -> TrialRecord {
        TrialRecord {
            stage1_choice: Some(a1),
            stage1_key: Some(Side::Left),
            stage1_rt: Some(0.5 + trial as f64 * 0.01),
            stage2_state: Some(s2),
            transition: Some(TransitionModel::kind_of(a1, s2)),
            stage2_choice: Some(a2),
            stage2_key: Some(Side::Right),
            stage2_rt: Some(0.75),
            reward: Some(reward),
            ..TrialRecord::begin(trial, probs())
        }
    }

    fn aborted_at_stage_one(trial: u32) -> TrialRecord {
        TrialRecord {
            aborted: true,
            ..TrialRecord::begin(trial, probs())
        }
    }

    fn sample_log() -> TrialLog {
        let mut log = TrialLog::new();
        log.append(completed(0, 0, 1, 1, 1));
        log.append(aborted_at_stage_one(1));
        log.append(completed(2, 0, 0, 0, 0));
        log.append(completed(3, 1, 0, 1, 1));
        log
    }

    #[test]
    fn csv_round_trip_preserves_fields() {
        let log = sample_log();
        let mut buf = Vec::new();
        log.write_csv(&mut buf, "s01", 2).unwrap();

        let rows = read_csv(buf.as_slice()).unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.subject_id == "s01" && r.block == 2));

        let back = TrialLog::from_rows(&rows).unwrap();
        for (a, b) in log.export().iter().zip(back.export()) {
            assert_eq!(a.trial, b.trial);
            assert_eq!(a.aborted, b.aborted);
            assert_eq!(a.stage1_choice, b.stage1_choice);
            assert_eq!(a.stage1_key, b.stage1_key);
            assert_eq!(a.stage2_state, b.stage2_state);
            assert_eq!(a.transition, b.transition);
            assert_eq!(a.stage2_choice, b.stage2_choice);
            assert_eq!(a.reward, b.reward);
            for (x, y) in [(a.stage1_rt, b.stage1_rt), (a.stage2_rt, b.stage2_rt)] {
                match (x, y) {
                    (Some(x), Some(y)) => assert!((x - y).abs() < 1e-9),
                    (None, None) => {}
                    other => panic!("rt mismatch: {other:?}"),
                }
            }
            for (x, y) in a.reward_probs.iter().zip(b.reward_probs.iter()) {
                assert!((x - y).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn header_and_missing_cells() {
        let mut log = TrialLog::new();
        log.append(aborted_at_stage_one(0));
        let mut buf = Vec::new();
        log.write_csv(&mut buf, "s01", 1).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "subject_id,block,trial,aborted,a1,a1_key,rt1,s2,transition,a2,a2_key,rt2,r,\
             rprob_00,rprob_01,rprob_10,rprob_11"
        );
        assert_eq!(lines.next().unwrap(), "s01,1,0,1,,,,,,,,,,0.25,0.5,0.625,0.75");
    }

    #[test]
    fn keys_and_transitions_are_written_as_labels() {
        let mut log = TrialLog::new();
        log.append(completed(0, 0, 1, 1, 1));
        let mut buf = Vec::new();
        log.write_csv(&mut buf, "s", 1).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert!(row.contains(",f,"));
        assert!(row.contains(",j,"));
        assert!(row.contains(",common,"));
    }

    #[test]
    fn from_rows_rejects_bad_values() {
        let mut buf = Vec::new();
        sample_log().write_csv(&mut buf, "s", 1).unwrap();
        let mut rows = read_csv(buf.as_slice()).unwrap();
        rows[2].a2 = Some(3);
        let err = TrialLog::from_rows(&rows).unwrap_err();
        assert!(matches!(err, ExportError::Malformed { row: 3, .. }));

        rows[2].a2 = Some(0);
        rows[0].transition = Some(TransitionKind::Rare);
        assert!(TrialLog::from_rows(&rows).is_err());
    }

    #[test]
    fn stay_rows_skip_aborted_attempts() {
        let log = sample_log();
        let rows = log.stay_rows();
        assert_eq!(rows.len(), 2);

        // trial 0 (a1=0, common, rewarded) -> trial 2 (a1=0): stay
        assert!(rows[0].stay);
        assert_eq!(rows[0].last_transition, TransitionKind::Common);
        assert!(rows[0].last_rewarded);
        assert_eq!(rows[0].rt2, Some(0.75));

        // trial 2 (a1=0, rare, unrewarded) -> trial 3 (a1=1): switch
        assert!(!rows[1].stay);
        assert_eq!(rows[1].last_transition, TransitionKind::Rare);
        assert!(!rows[1].last_rewarded);
    }

    #[test]
    fn stay_table_partitions_by_reward_and_transition() {
        let mut log = TrialLog::new();
        log.append(completed(0, 0, 1, 0, 1)); // common, rewarded
        log.append(completed(1, 0, 1, 0, 1)); // stay; common, rewarded
        log.append(completed(2, 1, 1, 0, 0)); // switch; rare, unrewarded
        log.append(completed(3, 1, 0, 0, 0)); // stay

        let t = log.stay_table();
        let cr = t.cell(true, TransitionKind::Common);
        assert_eq!(cr, StayCell { stays: 1, total: 2 });
        assert_eq!(cr.probability(), Some(0.5));

        let ru = t.cell(false, TransitionKind::Rare);
        assert_eq!(ru, StayCell { stays: 1, total: 1 });
        assert_eq!(t.cell(true, TransitionKind::Rare).probability(), None);
    }

    #[test]
    fn stay_csv_has_one_row_per_pair() {
        let mut buf = Vec::new();
        sample_log().write_stay_csv(&mut buf, "s01").unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "subject_id,stay,last_transition,last_rewarded,rt2");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "s01,1,common,1,0.75");
    }
}
