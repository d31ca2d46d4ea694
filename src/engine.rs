use crate::catalog::{Subject, SubjectCategory};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DueStatus {
    Completed,
    Pending,
}

impl DueStatus {
    pub fn is_completed(self) -> bool {
        self == DueStatus::Completed
    }
}

/// A marks row as the store returns it. Columns an older schema lacks come back
/// as `None` and are defaulted by [`reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkRow {
    pub subject: String,
    pub iat1: Option<i64>,
    pub iat2: Option<i64>,
    pub model: Option<i64>,
    pub signed: Option<bool>,
    pub assignment_submitted: Option<bool>,
    pub department_fine: Option<i64>,
}

/// A fully defaulted per-subject record. `department_fine == 0` means the fees
/// are paid; any positive value means they are pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRecord {
    pub subject: String,
    pub category: SubjectCategory,
    pub iat1: Option<i64>,
    pub iat2: Option<i64>,
    pub model: Option<i64>,
    pub signed: bool,
    pub assignment_submitted: bool,
    pub department_fine: i64,
}

impl MarkRecord {
    fn untouched(subject: &Subject) -> Self {
        Self {
            subject: subject.name.clone(),
            category: subject.category,
            iat1: None,
            iat2: None,
            model: None,
            signed: false,
            assignment_submitted: false,
            department_fine: 0,
        }
    }

    fn from_row(subject: &Subject, row: &MarkRow) -> Self {
        Self {
            subject: subject.name.clone(),
            category: subject.category,
            iat1: row.iat1,
            iat2: row.iat2,
            model: row.model,
            signed: row.signed.unwrap_or(false),
            assignment_submitted: row.assignment_submitted.unwrap_or(false),
            department_fine: row.department_fine.unwrap_or(0),
        }
    }

    pub fn fees_paid(&self) -> bool {
        self.department_fine == 0
    }

    pub fn score(&self, field: ScoreField) -> Option<i64> {
        match field {
            ScoreField::Iat1 => self.iat1,
            ScoreField::Iat2 => self.iat2,
            ScoreField::Model => self.model,
        }
    }

    #[cfg(test)]
    pub fn to_row(&self) -> MarkRow {
        MarkRow {
            subject: self.subject.clone(),
            iat1: self.iat1,
            iat2: self.iat2,
            model: self.model,
            signed: Some(self.signed),
            assignment_submitted: Some(self.assignment_submitted),
            department_fine: Some(self.department_fine),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreField {
    Iat1,
    Iat2,
    Model,
}

impl ScoreField {
    pub const ALL: [ScoreField; 3] = [ScoreField::Iat1, ScoreField::Iat2, ScoreField::Model];

    pub fn key(self) -> &'static str {
        match self {
            ScoreField::Iat1 => "iat1",
            ScoreField::Iat2 => "iat2",
            ScoreField::Model => "model",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldChange {
    Score(ScoreField, Option<i64>),
    Signed(bool),
    AssignmentSubmitted(bool),
    FeesPaid(bool),
}

impl FieldChange {
    pub fn key(self) -> &'static str {
        match self {
            FieldChange::Score(field, _) => field.key(),
            FieldChange::Signed(_) => "signed",
            FieldChange::AssignmentSubmitted(_) => "assignmentSubmitted",
            FieldChange::FeesPaid(_) => "departmentFees",
        }
    }

    /// Administrative subjects carry the signature and nothing else.
    pub fn applies_to(self, category: SubjectCategory) -> bool {
        category == SubjectCategory::Academic || matches!(self, FieldChange::Signed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkEdit {
    pub subject: String,
    pub change: FieldChange,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldPatch {
    pub signed: Option<bool>,
    pub assignment_submitted: Option<bool>,
    pub department_fine: Option<i64>,
}

/// Subject-keyed set of field overrides.
pub type MarkPatch = BTreeMap<String, FieldPatch>;

/// Every expected subject with a record, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompleteView {
    records: Vec<MarkRecord>,
}

impl CompleteView {
    pub fn records(&self) -> &[MarkRecord] {
        &self.records
    }

    pub fn record(&self, subject: &str) -> Option<&MarkRecord> {
        self.records.iter().find(|r| r.subject == subject)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[cfg(test)]
    pub fn to_rows(&self) -> Vec<MarkRow> {
        self.records.iter().map(MarkRecord::to_row).collect()
    }

    /// Returns a new view with one field changed. Unknown subjects leave the view as is.
    pub fn with_edit(&self, edit: &MarkEdit) -> CompleteView {
        let mut next = self.clone();
        if let Some(r) = next.records.iter_mut().find(|r| r.subject == edit.subject) {
            match edit.change {
                FieldChange::Score(ScoreField::Iat1, v) => r.iat1 = v,
                FieldChange::Score(ScoreField::Iat2, v) => r.iat2 = v,
                FieldChange::Score(ScoreField::Model, v) => r.model = v,
                FieldChange::Signed(v) => r.signed = v,
                FieldChange::AssignmentSubmitted(v) => r.assignment_submitted = v,
                FieldChange::FeesPaid(paid) => r.department_fine = fine_for(paid),
            }
        }
        next
    }

    pub fn apply_patch(&self, patch: &MarkPatch) -> CompleteView {
        let mut next = self.clone();
        for r in next.records.iter_mut() {
            let Some(p) = patch.get(&r.subject) else {
                continue;
            };
            if let Some(v) = p.signed {
                r.signed = v;
            }
            if let Some(v) = p.assignment_submitted {
                r.assignment_submitted = v;
            }
            if let Some(v) = p.department_fine {
                r.department_fine = v;
            }
        }
        next
    }

    fn academic(&self) -> impl Iterator<Item = &MarkRecord> {
        self.records
            .iter()
            .filter(|r| r.category == SubjectCategory::Academic)
    }
}

fn fine_for(paid: bool) -> i64 {
    if paid {
        0
    } else {
        1
    }
}

/// Left join of the catalog list with the stored rows, defaulting anything missing.
pub fn reconcile(expected: &[Subject], raw: &[MarkRow]) -> CompleteView {
    let by_subject: HashMap<&str, &MarkRow> =
        raw.iter().map(|m| (m.subject.as_str(), m)).collect();
    let records = expected
        .iter()
        .map(|s| match by_subject.get(s.name.as_str()) {
            Some(row) => MarkRecord::from_row(s, row),
            None => MarkRecord::untouched(s),
        })
        .collect();
    CompleteView { records }
}

/// Scores never take part: due status tracks clearance, not performance.
pub fn due_status(subject: &Subject, mark: &MarkRecord) -> DueStatus {
    let cleared = match subject.category {
        SubjectCategory::Administrative => mark.signed,
        SubjectCategory::Academic => mark.assignment_submitted && mark.fees_paid(),
    };
    if cleared {
        DueStatus::Completed
    } else {
        DueStatus::Pending
    }
}

/// An empty subject list is `Completed`.
pub fn overall_status(expected: &[Subject], view: &CompleteView) -> DueStatus {
    let all_cleared = expected.iter().all(|s| {
        let status = match view.record(&s.name) {
            Some(r) => due_status(s, r),
            None => due_status(s, &MarkRecord::untouched(s)),
        };
        status.is_completed()
    });
    if all_cleared {
        DueStatus::Completed
    } else {
        DueStatus::Pending
    }
}

pub fn subject_statuses<'a>(
    expected: &'a [Subject],
    view: &'a CompleteView,
) -> impl Iterator<Item = (&'a MarkRecord, DueStatus)> + 'a {
    view.records().iter().map(move |r| {
        let status = match expected.iter().find(|s| s.name == r.subject) {
            Some(s) => due_status(s, r),
            None => DueStatus::Pending,
        };
        (r, status)
    })
}

pub fn apply_bulk_fee_update(expected: &[Subject], is_paid: bool) -> MarkPatch {
    academic_patch(expected, |p| p.department_fine = Some(fine_for(is_paid)))
}

pub fn apply_bulk_assignment_update(expected: &[Subject], submitted: bool) -> MarkPatch {
    academic_patch(expected, |p| p.assignment_submitted = Some(submitted))
}

fn academic_patch(expected: &[Subject], set: impl Fn(&mut FieldPatch)) -> MarkPatch {
    expected
        .iter()
        .filter(|s| !s.is_administrative())
        .map(|s| {
            let mut p = FieldPatch::default();
            set(&mut p);
            (s.name.clone(), p)
        })
        .collect()
}

/// Mean of the entered scores over academic subjects, rounded half up.
pub fn score_average(view: &CompleteView, field: ScoreField) -> Option<i64> {
    let scores: Vec<i64> = view.academic().filter_map(|r| r.score(field)).collect();
    if scores.is_empty() {
        return None;
    }
    let mean = scores.iter().sum::<i64>() as f64 / scores.len() as f64;
    Some((mean + 0.5).floor() as i64)
}

pub fn assignments_complete(view: &CompleteView) -> bool {
    view.academic().all(|r| r.assignment_submitted)
}

pub fn fees_paid(view: &CompleteView) -> bool {
    view.academic().all(MarkRecord::fees_paid)
}

/// Records in `after` that differ from the same subject in `before`.
pub fn changed_subjects<'a>(before: &CompleteView, after: &'a CompleteView) -> Vec<&'a MarkRecord> {
    after
        .records()
        .iter()
        .filter(|r| before.record(&r.subject) != Some(*r))
        .collect()
}
