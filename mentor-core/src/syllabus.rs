use mentor_types::PlanRequest;

const NEET: &str = "
NEET Biology Syllabus:
1. Cell Biology - Cell structure, cell organelles, cell division (mitosis, meiosis)
2. Genetics - Mendelian genetics, molecular biology, DNA replication, transcription, translation
3. Human Physiology - Digestion, Circulation, Respiration, Excretion, Neural control
4. Plant Physiology - Photosynthesis, Respiration, Plant hormones, Mineral nutrition
5. Ecology - Ecosystems, Biodiversity, Environmental issues, Population dynamics
6. Evolution - Origin of life, Theories of evolution, Human evolution
7. Biotechnology - Recombinant DNA, Applications in medicine and agriculture
8. Reproduction - Human reproduction, Plant reproduction, Reproductive health
";

const JEE: &str = "
JEE Physics & Chemistry Syllabus:
Physics:
1. Mechanics - Laws of motion, Work-Energy, Rotational dynamics
2. Electromagnetism - Electrostatics, Magnetism, Electromagnetic induction
3. Optics - Ray optics, Wave optics, Modern physics
4. Thermodynamics - Heat, Kinetic theory, Laws of thermodynamics

Chemistry:
1. Physical Chemistry - Atomic structure, Chemical bonding, Thermodynamics
2. Organic Chemistry - Hydrocarbons, Functional groups, Reaction mechanisms
3. Inorganic Chemistry - Periodic table, Coordination compounds, Metallurgy
";

const UPSC: &str = "
UPSC Civil Services Syllabus:
1. History - Ancient, Medieval, Modern India, World History
2. Geography - Physical, Indian, World Geography
3. Polity - Constitution, Governance, International Relations
4. Economy - Indian Economy, Economic Development
5. Environment - Ecology, Biodiversity, Climate Change
6. Science & Technology - Current developments, Space, IT
7. Ethics - Aptitude, Integrity, Case Studies
";

const CAT: &str = "
CAT MBA Entrance Syllabus:
1. Quantitative Ability - Arithmetic, Algebra, Geometry, Number Systems
2. Verbal Ability - Reading Comprehension, Grammar, Vocabulary
3. Data Interpretation - Tables, Graphs, Charts, Caselets
4. Logical Reasoning - Puzzles, Arrangements, Logical Deductions
";

/// Built-in syllabus for an exam category. Unknown categories get NEET's.
pub fn default_syllabus(exam_type: &str) -> &'static str {
    match exam_type.to_ascii_lowercase().as_str() {
        "jee" => JEE,
        "upsc" => UPSC,
        "cat" => CAT,
        _ => NEET,
    }
}

/// The request as it goes on the wire: blank syllabus text replaced by the default.
pub fn with_default_syllabus(mut request: PlanRequest) -> PlanRequest {
    if request.syllabus_text.trim().is_empty() {
        request.syllabus_text = default_syllabus(&request.exam_type).to_string();
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_case_insensitive_with_neet_fallback() {
        assert!(default_syllabus("JEE").contains("Electromagnetism"));
        assert!(default_syllabus("cat").contains("Logical Reasoning"));
        assert_eq!(default_syllabus("gre"), default_syllabus("neet"));
    }

    #[test]
    fn only_blank_text_is_replaced() {
        let filled = with_default_syllabus(PlanRequest::new("UPSC", "Prelims", 30));
        assert!(filled.syllabus_text.contains("Polity"));

        let own = with_default_syllabus(PlanRequest::new("UPSC", "Prelims", 30).with_syllabus("Modern India only"));
        assert_eq!(own.syllabus_text, "Modern India only");
    }
}
