use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::position::RoundPosition;
use crate::error::TemplateDefect;

pub const SLOT_ROUND: &str = "[RUNDE]";
pub const SLOT_ROUND_GOAL: &str = "[RUNDEUNDZIEL]";
pub const SLOT_INPUT: &str = "[EINGABE]";
pub const SLOT_TASK: &str = "[AUFGABE]";
pub const SLOT_OUTPUT: &str = "[AUSGABE]";

pub const STEP1_SITUATIONS: &str = r#"Du arbeitest als Interpret im Verfahren der Sequenzanalyse der Objektiven Hermeneutik.

Schritt 1: Geschichten erzählen.

Du erhältst genau eine Sequenz, also eine Äußerung oder eine kurze Textstelle. Du kennst bewusst NICHT den Kontext, in dem sie tatsächlich gefallen ist.

Erzähle möglichst verschiedene, lebenspraktisch plausible Situationen, in denen genau diese Sequenz wortwörtlich geäußert werden könnte. Die Situationen sollen sich deutlich voneinander unterscheiden (Sprecher, Adressat, sozialer Ort, Anlass). Jede Situation bekommt einen knappen Titel und eine kurze Szene in zwei bis vier Sätzen.

Regeln:
- Übernimm die Sequenz wörtlich, verändere sie nicht.
- Erfinde keinen Kontext über die Szene hinaus und beziehe dich nicht auf andere Sequenzen.
- Bevorzuge Alltagssituationen vor exotischen Konstruktionen.
- Erzeuge zwischen fünf und zehn Situationen."#;

pub const STEP2_READINGS: &str = r#"Du arbeitest als Interpret im Verfahren der Sequenzanalyse der Objektiven Hermeneutik.

Schritt 2: Lesarten bilden.

Du erhältst als JSON die in Schritt 1 erzählten Beispielsituationen zu einer Sequenz (Feld "beispielsituationen", jeweils mit "titel" und "szene").

Gruppiere die Situationen nach ihrer gemeinsamen Bedeutungsstruktur und formuliere daraus kontextfreie Lesarten der Sequenz. Eine Lesart beschreibt, welche Regel oder welcher Sinn die Sequenz in all den ihr zugeordneten Situationen angemessen macht.

Für jede Lesart:
- vergib einen prägnanten Titel und eine Beschreibung der Bedeutungsstruktur,
- nenne die Titel aller passenden Beispielsituationen (wörtlich wie in der Eingabe),
- wähle die am besten passende Beispielsituation aus und übernimm sie vollständig,
- benenne, was die passenden Situationen gemeinsam haben und worin sie sich unterscheiden.

Jede Beispielsituation soll mindestens einer Lesart zugeordnet sein."#;

pub const STEP3_TEMPLATE: &str = r#"Du arbeitest als Interpret im Verfahren der Sequenzanalyse der Objektiven Hermeneutik.

Schritt 3: Konfrontation mit dem tatsächlichen Kontext. Dies ist Runde [RUNDE] der Analyse.

[RUNDEUNDZIEL]

Eingabe:
[EINGABE]

Aufgabe:
[AUFGABE]

Ausgabe:
[AUSGABE]"#;

pub const STEP3_ROUND_GOAL_START: &str = r#"Dies ist die erste Sequenz des Protokolls. Es gibt noch kein bisheriges Protokoll und keine Fallstrukturhypothese. Ziel dieser Runde ist eine erste Fallstrukturhypothese."#;

pub const STEP3_ROUND_GOAL_MIDDLE: &str = r#"Das Protokoll ist bereits teilweise analysiert. Ziel dieser Runde ist es, die bisherige Fallstrukturhypothese an der neuen Sequenz zu prüfen und fortzuschreiben."#;

pub const STEP3_ROUND_GOAL_END: &str = r#"Dies ist die letzte Sequenz des Protokolls. Ziel dieser Runde ist es, die Fallstrukturhypothese abschließend zu prüfen und eine finale Fallstrukturhypothese zu formulieren."#;

pub const STEP3_INPUT_START: &str = r#"Du erhältst ein JSON-Objekt mit
- "sequence": die zu analysierende Sequenz,
- "actual_context": mit "outer_context", dem äußeren Kontext des Protokolls,
- "context_free_readings": die kontextfreien Lesarten aus Schritt 2."#;

pub const STEP3_INPUT_MIDDLE_END: &str = r#"Du erhältst ein JSON-Objekt mit
- "sequence": die zu analysierende Sequenz,
- "actual_context": mit "outer_context", dem äußeren Kontext, und "inner_context", dem bisherigen Protokoll vor dieser Sequenz,
- "expected_continuations": die in früheren Runden erwarteten Fortführungen (kann leer sein),
- "prior_case_hypothesis": die bisherige Fallstrukturhypothese,
- "context_free_readings": die kontextfreien Lesarten aus Schritt 2."#;

pub const STEP3_TASK_START: &str = r#"1. Beurteile, ob die Sequenz im äußeren Kontext erwartbar oder überraschend ist, und begründe das.
2. Prüfe jede kontextfreie Lesart gegen den Kontext: passt sie gut, teilweise oder schlecht/gar nicht?
3. Ziehe ein Zwischenfazit.
4. Formuliere die Lesarten, die der Kontext nahelegt (kontextinduzierte Lesarten).
5. Prognostiziere die nächste Sequenz auf Grundlage der plausibelsten Lesart.
6. Formuliere eine erste Fallstrukturhypothese."#;

pub const STEP3_TASK_MIDDLE: &str = r#"1. Beurteile, ob die Sequenz im Kontext erwartbar oder überraschend ist, und begründe das.
2. Vergleiche die Sequenz mit jeder erwarteten Fortführung: wie gut entspricht sie ihr?
3. Benenne, was die Sequenz an der bisherigen Fallstrukturhypothese bestätigt und was sie infrage stellt.
4. Prüfe jede kontextfreie Lesart gegen den Kontext.
5. Ziehe ein Zwischenfazit und formuliere die kontextinduzierten Lesarten.
6. Prognostiziere die nächste Sequenz.
7. Formuliere die fortgeschriebene, neue Fallstrukturhypothese."#;

pub const STEP3_TASK_END: &str = r#"1. Beurteile, ob die Sequenz im Kontext erwartbar oder überraschend ist, und begründe das.
2. Vergleiche die Sequenz mit jeder erwarteten Fortführung: wie gut entspricht sie ihr?
3. Benenne, was die Sequenz an der bisherigen Fallstrukturhypothese bestätigt und was sie infrage stellt.
4. Prüfe jede kontextfreie Lesart gegen den Kontext.
5. Ziehe ein Zwischenfazit und formuliere die kontextinduzierten Lesarten.
6. Formuliere die finale Fallstrukturhypothese für das gesamte Protokoll. Es folgt keine weitere Sequenz."#;

pub const STEP3_OUTPUT_START: &str = r#"Antworte ausschließlich im vorgegebenen Schema. Das Feld "erste_fallstrukturhypothese" enthält die erste Fallstrukturhypothese."#;

pub const STEP3_OUTPUT_MIDDLE: &str = r#"Antworte ausschließlich im vorgegebenen Schema. Das Feld "neue_fallstrukturhypothese" enthält die fortgeschriebene Fallstrukturhypothese."#;

pub const STEP3_OUTPUT_END: &str = r#"Antworte ausschließlich im vorgegebenen Schema. Das Feld "finale_fallstrukturhypothese" enthält die finale Fallstrukturhypothese. Es gibt keine Prognose mehr."#;

/// The four position-dependent step-3 fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step3Fragments<'a> {
    pub round_goal: &'a str,
    pub input: &'a str,
    pub task: &'a str,
    pub output: &'a str,
}

/// All instruction texts of one analysis. Built-ins unless overridden from disk.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub step1_situations: String,
    pub step2_readings: String,
    pub step3_template: String,

    pub step3_round_goal_start: String,
    pub step3_round_goal_middle: String,
    pub step3_round_goal_end: String,

    pub step3_input_start: String,
    pub step3_input_middle_end: String,

    pub step3_task_start: String,
    pub step3_task_middle: String,
    pub step3_task_end: String,

    pub step3_output_start: String,
    pub step3_output_middle: String,
    pub step3_output_end: String,

    /// Keys replaced by files in the prompts directory.
    pub overridden: Vec<&'static str>,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            step1_situations: STEP1_SITUATIONS.to_string(),
            step2_readings: STEP2_READINGS.to_string(),
            step3_template: STEP3_TEMPLATE.to_string(),
            step3_round_goal_start: STEP3_ROUND_GOAL_START.to_string(),
            step3_round_goal_middle: STEP3_ROUND_GOAL_MIDDLE.to_string(),
            step3_round_goal_end: STEP3_ROUND_GOAL_END.to_string(),
            step3_input_start: STEP3_INPUT_START.to_string(),
            step3_input_middle_end: STEP3_INPUT_MIDDLE_END.to_string(),
            step3_task_start: STEP3_TASK_START.to_string(),
            step3_task_middle: STEP3_TASK_MIDDLE.to_string(),
            step3_task_end: STEP3_TASK_END.to_string(),
            step3_output_start: STEP3_OUTPUT_START.to_string(),
            step3_output_middle: STEP3_OUTPUT_MIDDLE.to_string(),
            step3_output_end: STEP3_OUTPUT_END.to_string(),
            overridden: Vec::new(),
        }
    }
}

impl PromptSet {
    fn entries_mut(&mut self) -> [(&'static str, &mut String); 14] {
        [
            ("schritt1_beispielsituationen", &mut self.step1_situations),
            ("schritt2_lesarten", &mut self.step2_readings),
            ("schritt3_template", &mut self.step3_template),
            ("schritt3_rundeundziel_anfang", &mut self.step3_round_goal_start),
            ("schritt3_rundeundziel_mitte", &mut self.step3_round_goal_middle),
            ("schritt3_rundeundziel_ende", &mut self.step3_round_goal_end),
            ("schritt3_eingabe_anfang", &mut self.step3_input_start),
            ("schritt3_eingabe_mitte_ende", &mut self.step3_input_middle_end),
            ("schritt3_aufgabe_anfang", &mut self.step3_task_start),
            ("schritt3_aufgabe_mitte", &mut self.step3_task_middle),
            ("schritt3_aufgabe_ende", &mut self.step3_task_end),
            ("schritt3_ausgabe_anfang", &mut self.step3_output_start),
            ("schritt3_ausgabe_mitte", &mut self.step3_output_middle),
            ("schritt3_ausgabe_ende", &mut self.step3_output_end),
        ]
    }

    /// Names of every overridable text (file stem in the prompts directory).
    pub fn keys() -> Vec<&'static str> {
        Self::default().entries_mut().iter().map(|(k, _)| *k).collect()
    }

    /// Built-in texts, with `<key>.txt` files from `dir` taking precedence.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut prompts = Self::default();
        let mut overridden = Vec::new();

        for (key, text) in prompts.entries_mut() {
            let path = dir.join(format!("{}.txt", key));
            if !path.is_file() {
                continue;
            }
            *text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read prompt {}", path.display()))?;
            overridden.push(key);
        }

        if !overridden.is_empty() {
            info!(dir = %dir.display(), count = overridden.len(), "Prompt overrides loaded");
        }
        prompts.overridden = overridden;
        Ok(prompts)
    }

    /// Pick the step-3 fragments for a round position.
    pub fn fragments(&self, position: RoundPosition) -> Step3Fragments<'_> {
        match position {
            RoundPosition::First => Step3Fragments {
                round_goal: &self.step3_round_goal_start,
                input: &self.step3_input_start,
                task: &self.step3_task_start,
                output: &self.step3_output_start,
            },
            RoundPosition::Middle => Step3Fragments {
                round_goal: &self.step3_round_goal_middle,
                input: &self.step3_input_middle_end,
                task: &self.step3_task_middle,
                output: &self.step3_output_middle,
            },
            RoundPosition::Last => Step3Fragments {
                round_goal: &self.step3_round_goal_end,
                input: &self.step3_input_middle_end,
                task: &self.step3_task_end,
                output: &self.step3_output_end,
            },
        }
    }

    /// Developer instruction for step 3 of `round`.
    pub fn confrontation_instruction(
        &self,
        round: usize,
        position: RoundPosition,
    ) -> Result<String, TemplateDefect> {
        let fragments = self.fragments(position);
        let round = round.to_string();
        render_template(
            &self.step3_template,
            &[
                (SLOT_ROUND, &round),
                (SLOT_ROUND_GOAL, fragments.round_goal),
                (SLOT_INPUT, fragments.input),
                (SLOT_TASK, fragments.task),
                (SLOT_OUTPUT, fragments.output),
            ],
        )
    }
}

/// Replace each slot marker literally, then trim.
///
/// Every marker must occur exactly once in `template` and none may survive
/// substitution (a fragment carrying a marker counts as a defect).
pub fn render_template(
    template: &str,
    slots: &[(&'static str, &str)],
) -> Result<String, TemplateDefect> {
    for &(marker, _) in slots {
        match template.matches(marker).count() {
            0 => return Err(TemplateDefect::MissingSlot(marker)),
            1 => {}
            n => return Err(TemplateDefect::DuplicateSlot(marker, n)),
        }
    }

    let mut rendered = template.to_string();
    for &(marker, value) in slots {
        rendered = rendered.replace(marker, value);
    }

    if let Some(&(marker, _)) = slots.iter().find(|(m, _)| rendered.contains(m)) {
        return Err(TemplateDefect::UnresolvedSlot(marker));
    }

    Ok(rendered.trim().to_string())
}
