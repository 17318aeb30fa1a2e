use super::{CatalogBuilder, MetricCatalog, MetricDefinition};
use crate::scoring::domain::{GroupKey, MetricCode, ScoringKind};

use ScoringKind::{BooleanChecklist, EnumOptionCount, FiveYearAverageCount, FiveYearAverageRatio};

// Criterion weights reproduce the weighted-score multipliers of the legacy
// dashboard (0.1 / 0.3 / 0.2 / 0.1 x4). Sub-criterion weights for criteria 1 and 2
// are the legacy sub-score multipliers; the rest are equal until the institution
// supplies its own catalog CSV.
const CRITERIA: &[(u8, &str, f64)] = &[
    (1, "Curricular Aspects", 0.10),
    (2, "Teaching-Learning and Evaluation", 0.30),
    (3, "Research, Innovations and Extension", 0.20),
    (4, "Infrastructure and Learning Resources", 0.10),
    (5, "Student Support and Progression", 0.10),
    (6, "Governance, Leadership and Management", 0.10),
    (7, "Institutional Values and Best Practices", 0.10),
];

const SUB_CRITERIA: &[(u8, u8, &str, f64)] = &[
    (1, 1, "Curriculum Planning and Implementation", 5.0),
    (1, 2, "Academic Flexibility", 30.0),
    (1, 3, "Curriculum Enrichment", 20.0),
    (1, 4, "Feedback System", 20.0),
    (2, 1, "Student Enrolment and Profile", 40.0),
    (2, 2, "Student Teacher Ratio", 20.0),
    (2, 3, "Teaching-Learning Process", 15.0),
    (2, 4, "Teacher Profile and Quality", 60.0),
    (2, 6, "Student Performance and Learning Outcome", 30.0),
    (2, 7, "Student Satisfaction Survey", 60.0),
    (3, 1, "Resource Mobilization for Research", 1.0),
    (3, 2, "Research Publication and Awards", 1.0),
    (3, 4, "Collaboration", 1.0),
    (4, 1, "Physical Facilities", 1.0),
    (4, 2, "Library as a Learning Resource", 1.0),
    (4, 4, "Maintenance of Campus Infrastructure", 1.0),
    (5, 1, "Student Support", 1.0),
    (5, 2, "Student Progression", 1.0),
    (6, 2, "Strategy Development and Deployment", 1.0),
    (6, 3, "Faculty Empowerment Strategies", 1.0),
    (6, 5, "Internal Quality Assurance System", 1.0),
    (7, 1, "Institutional Values and Social Responsibilities", 1.0),
];

// One teacher per twenty students earns full credit; 1:30, 1:40, 1:50 step down.
const TEACHER_RATIO_CEILING: f64 = 1.0 / 20.0;
const TEACHER_RATIO_POINTS: [f64; 4] = [100.0, 66.67, 50.0, 40.0];

pub(super) fn standard_catalog() -> MetricCatalog {
    let mut builder = CatalogBuilder::default();

    for (criterion, title, weight) in CRITERIA {
        builder = builder.group(GroupKey::criterion(*criterion), *title, *weight);
    }
    for (criterion, sub, title, weight) in SUB_CRITERIA {
        builder = builder.group(GroupKey::sub_criterion(*criterion, *sub), *title, *weight);
    }

    for definition in standard_metrics() {
        builder = builder.metric(definition);
    }

    match builder.build() {
        Ok(catalog) => catalog,
        Err(err) => unreachable!("standard catalog is statically consistent: {err}"),
    }
}

fn metric(raw: &str, title: &str, kind: ScoringKind) -> MetricDefinition {
    match MetricCode::parse(raw) {
        Ok(code) => MetricDefinition::new(code, title, kind),
        Err(err) => unreachable!("standard metric codes are well formed: {err}"),
    }
}

fn standard_metrics() -> Vec<MetricDefinition> {
    vec![
        // Criterion 1
        metric(
            "1.1.3",
            "Teachers participating in academic council and university bodies",
            EnumOptionCount,
        ),
        metric(
            "1.2.1",
            "Programmes with CBCS or elective course system",
            FiveYearAverageRatio,
        ),
        metric(
            "1.2.2",
            "Students enrolled in add-on or certificate programmes",
            FiveYearAverageRatio,
        ),
        metric(
            "1.3.2",
            "Courses that include experiential learning",
            FiveYearAverageRatio,
        ),
        metric(
            "1.3.3",
            "Students undertaking project work or internships",
            FiveYearAverageRatio,
        ),
        metric(
            "1.4.1",
            "Structured feedback collected from stakeholders",
            EnumOptionCount,
        ),
        metric(
            "1.4.2",
            "Feedback processes of the institution",
            EnumOptionCount,
        ),
        // Criterion 2
        metric(
            "2.1.1",
            "Enrolment percentage against sanctioned seats",
            FiveYearAverageRatio,
        )
        .point_thresholds([80.0, 60.0, 40.0, 30.0]),
        metric(
            "2.1.2",
            "Seats filled against reserved categories",
            FiveYearAverageRatio,
        )
        .point_thresholds([80.0, 60.0, 40.0, 30.0]),
        metric(
            "2.2.2",
            "Full-time teachers per enrolled student",
            FiveYearAverageCount,
        )
        .max_score(TEACHER_RATIO_CEILING)
        .point_thresholds(TEACHER_RATIO_POINTS),
        metric("2.3.3", "Mentors per mentee", FiveYearAverageCount)
            .max_score(TEACHER_RATIO_CEILING)
            .point_thresholds(TEACHER_RATIO_POINTS),
        metric(
            "2.4.1",
            "Full-time teachers against sanctioned posts",
            FiveYearAverageRatio,
        )
        .point_thresholds([75.0, 65.0, 50.0, 40.0]),
        metric(
            "2.4.2",
            "Full-time teachers with Ph.D. / NET / SET",
            FiveYearAverageRatio,
        )
        .point_thresholds([75.0, 60.0, 50.0, 30.0]),
        metric(
            "2.4.3",
            "Average teaching experience of full-time teachers",
            FiveYearAverageCount,
        )
        .max_score(15.0)
        .point_thresholds([100.0, 80.0, 60.0, 40.0]),
        metric(
            "2.6.3",
            "Pass percentage of final year students",
            FiveYearAverageRatio,
        )
        .point_thresholds([90.0, 80.0, 70.0, 60.0]),
        metric(
            "2.7.1",
            "Student satisfaction survey",
            FiveYearAverageRatio,
        ),
        // Criterion 3
        metric(
            "3.1.1",
            "Research grants received per teacher (INR lakhs)",
            FiveYearAverageCount,
        )
        .max_score(5.0),
        metric(
            "3.1.3",
            "Workshops and seminars conducted per year",
            FiveYearAverageCount,
        )
        .max_score(10.0),
        metric(
            "3.2.1",
            "Papers published per teacher in UGC-listed journals",
            FiveYearAverageCount,
        )
        .max_score(1.0),
        metric(
            "3.2.2",
            "Books and chapters published per teacher",
            FiveYearAverageCount,
        )
        .max_score(1.0),
        metric(
            "3.4.1",
            "Collaborative activities per year",
            FiveYearAverageCount,
        )
        .max_score(10.0),
        metric(
            "3.4.2",
            "Functional MoUs per year",
            FiveYearAverageCount,
        )
        .max_score(5.0),
        // Criterion 4
        metric(
            "4.1.4",
            "Infrastructure augmentation share of expenditure",
            FiveYearAverageCount,
        )
        .max_score(0.25),
        metric(
            "4.2.2",
            "Subscriptions to e-resources",
            EnumOptionCount,
        ),
        metric(
            "4.4.1",
            "Maintenance share of expenditure",
            FiveYearAverageCount,
        )
        .max_score(0.25),
        // Criterion 5
        metric(
            "5.1.2",
            "Students benefited by scholarships and free-ships",
            FiveYearAverageRatio,
        ),
        metric(
            "5.2.3",
            "Students qualifying in state, national, or international examinations",
            FiveYearAverageRatio,
        ),
        // Criterion 6
        metric(
            "6.2.3",
            "Areas of e-governance implemented",
            EnumOptionCount,
        ),
        metric(
            "6.3.2",
            "Teachers given financial support for conferences",
            FiveYearAverageRatio,
        ),
        metric(
            "6.3.4",
            "Teachers attending professional development programmes",
            FiveYearAverageRatio,
        ),
        metric(
            "6.5.3",
            "Quality assurance initiatives",
            EnumOptionCount,
        ),
        // Criterion 7
        metric(
            "7.1.2",
            "Facilities for alternate sources of energy and conservation",
            EnumOptionCount,
        ),
        metric(
            "7.1.4",
            "Water conservation facilities",
            EnumOptionCount,
        ),
        metric(
            "7.1.5",
            "Green campus initiatives",
            EnumOptionCount,
        ),
        metric(
            "7.1.6",
            "Quality audits on environment and energy",
            EnumOptionCount,
        ),
        metric(
            "7.1.7",
            "Disabled-friendly, barrier free environment",
            EnumOptionCount,
        ),
        metric(
            "7.1.10",
            "Code of conduct for students, teachers, administrators, and staff",
            BooleanChecklist,
        )
        .checklist([
            "code_published",
            "monitoring_committee",
            "ethics_programs",
            "awareness_programs",
        ]),
    ]
}
