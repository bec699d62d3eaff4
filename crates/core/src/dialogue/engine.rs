use crate::dialogue::states::{
    DialogueAction, DialogueReply, DialogueStage, Session, SessionChange, TransitionOutcome,
};
use crate::domain::material::MaterialCatalog;
use crate::domain::quotation::{ContactInfo, Dimensions};
use crate::pricing::CostCalculator;

pub const DEFAULT_TRIGGER_PHRASE: &str = "เริ่มคำนวณ";

/// Knobs that vary between deployments of the questionnaire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialoguePolicy {
    pub trigger_phrase: String,
    pub affirmative_replies: Vec<String>,
    pub cancel_phrases: Vec<String>,
    pub collect_contact_info: bool,
    pub reject_non_positive_dimensions: bool,
}

impl Default for DialoguePolicy {
    fn default() -> Self {
        Self {
            trigger_phrase: DEFAULT_TRIGGER_PHRASE.to_owned(),
            affirmative_replies: vec!["ใช่".to_owned(), "yes".to_owned(), "ขอใบเสนอราคา".to_owned()],
            cancel_phrases: vec!["ยกเลิก".to_owned(), "cancel".to_owned()],
            collect_contact_info: true,
            reject_non_positive_dimensions: false,
        }
    }
}

impl DialoguePolicy {
    pub fn is_trigger(&self, text: &str) -> bool {
        text.trim() == self.trigger_phrase.trim()
    }

    pub fn is_affirmative(&self, text: &str) -> bool {
        matches_any(&self.affirmative_replies, text)
    }

    pub fn is_cancel(&self, text: &str) -> bool {
        matches_any(&self.cancel_phrases, text)
    }
}

fn matches_any(candidates: &[String], text: &str) -> bool {
    let text = text.trim();
    candidates.iter().any(|candidate| candidate.trim().eq_ignore_ascii_case(text))
}

/// Pure transition function of the order-intake questionnaire.
#[derive(Clone, Debug)]
pub struct DialogueEngine {
    catalog: MaterialCatalog,
    calculator: CostCalculator,
    policy: DialoguePolicy,
}

impl Default for DialogueEngine {
    fn default() -> Self {
        Self::new(MaterialCatalog::standard(), CostCalculator::default(), DialoguePolicy::default())
    }
}

impl DialogueEngine {
    pub fn new(catalog: MaterialCatalog, calculator: CostCalculator, policy: DialoguePolicy) -> Self {
        Self { catalog, calculator, policy }
    }

    pub fn apply(&self, current: Option<&Session>, text: &str) -> TransitionOutcome {
        let from = DialogueStage::of(current);

        if self.policy.is_trigger(text) {
            return outcome(
                from,
                SessionChange::Store(Session::AwaitingMaterial),
                DialogueReply::MaterialPrompt { materials: self.material_names() },
            );
        }

        let Some(session) = current else {
            return outcome(from, SessionChange::Unchanged, DialogueReply::NoActiveSession);
        };

        if self.policy.is_cancel(text) {
            return outcome(from, SessionChange::Remove, DialogueReply::Cancelled);
        }

        match session {
            Session::AwaitingMaterial => self.on_material(from, text),
            Session::AwaitingDimensions { material } => match self.parse_dimensions(text) {
                Some(dimensions) => outcome(
                    from,
                    SessionChange::Store(Session::AwaitingQuantity {
                        material: material.clone(),
                        dimensions,
                    }),
                    DialogueReply::QuantityPrompt,
                ),
                None => outcome(from, SessionChange::Unchanged, DialogueReply::InvalidDimensions),
            },
            Session::AwaitingQuantity { material, dimensions } => match parse_quantity(text) {
                Some(quantity) => {
                    let estimate = self.calculator.estimate(material, *dimensions, quantity);
                    if !estimate.total_cost.is_finite() {
                        return outcome(
                            from,
                            SessionChange::Unchanged,
                            DialogueReply::InvalidQuantity,
                        );
                    }
                    outcome(
                        from,
                        SessionChange::Store(Session::AwaitingConfirmation {
                            estimate: estimate.clone(),
                        }),
                        DialogueReply::Summary { estimate },
                    )
                }
                None => outcome(from, SessionChange::Unchanged, DialogueReply::InvalidQuantity),
            },
            Session::AwaitingConfirmation { estimate } => {
                if !self.policy.is_affirmative(text) {
                    return outcome(
                        from,
                        SessionChange::Unchanged,
                        DialogueReply::ConfirmationReprompt,
                    );
                }
                if self.policy.collect_contact_info {
                    return outcome(
                        from,
                        SessionChange::Store(Session::AwaitingContactInfo {
                            estimate: estimate.clone(),
                        }),
                        DialogueReply::ContactPrompt,
                    );
                }
                TransitionOutcome {
                    action: Some(DialogueAction::PersistQuotation {
                        estimate: estimate.clone(),
                        contact: None,
                    }),
                    ..outcome(from, SessionChange::Remove, DialogueReply::Completed)
                }
            }
            Session::AwaitingContactInfo { estimate } => match parse_contact(text) {
                Some(contact) => TransitionOutcome {
                    action: Some(DialogueAction::PersistQuotation {
                        estimate: estimate.clone(),
                        contact: Some(contact),
                    }),
                    ..outcome(from, SessionChange::Remove, DialogueReply::Completed)
                },
                None => outcome(from, SessionChange::Unchanged, DialogueReply::InvalidContact),
            },
        }
    }

    fn on_material(&self, from: DialogueStage, text: &str) -> TransitionOutcome {
        match self.catalog.lookup(text) {
            Some(material) => outcome(
                from,
                SessionChange::Store(Session::AwaitingDimensions { material: material.clone() }),
                DialogueReply::DimensionsPrompt,
            ),
            None => outcome(
                from,
                SessionChange::Unchanged,
                DialogueReply::InvalidMaterial { materials: self.material_names() },
            ),
        }
    }

    fn parse_dimensions(&self, text: &str) -> Option<Dimensions> {
        let dimensions = parse_dimensions(text)?;
        if self.policy.reject_non_positive_dimensions && !dimensions.is_positive() {
            return None;
        }
        Some(dimensions)
    }

    fn material_names(&self) -> Vec<String> {
        self.catalog.names().into_iter().map(str::to_owned).collect()
    }
}

fn outcome(from: DialogueStage, session: SessionChange, reply: DialogueReply) -> TransitionOutcome {
    let to = match &session {
        SessionChange::Unchanged => from,
        SessionChange::Store(next) => next.stage(),
        SessionChange::Remove => DialogueStage::NoSession,
    };
    TransitionOutcome { from, to, session, reply, action: None }
}

/// `w x l x h` with any whitespace; the separator is the letter `x` in either case.
/// Sides whose product is not a finite volume are rejected.
pub fn parse_dimensions(text: &str) -> Option<Dimensions> {
    let compact: String =
        text.chars().filter(|ch| !ch.is_whitespace()).map(|ch| ch.to_ascii_lowercase()).collect();

    let mut sides = [0.0_f64; 3];
    let mut count = 0;
    for token in compact.split('x') {
        if count == sides.len() {
            return None;
        }
        let value = token.parse::<f64>().ok().filter(|value| value.is_finite())?;
        sides[count] = value;
        count += 1;
    }

    if count != sides.len() {
        return None;
    }
    let dimensions = Dimensions::new(sides[0], sides[1], sides[2]);
    dimensions.volume_cm3().is_finite().then_some(dimensions)
}

pub fn parse_quantity(text: &str) -> Option<u32> {
    let value = text.trim().parse::<i64>().ok()?;
    if value <= 0 {
        return None;
    }
    u32::try_from(value).ok()
}

/// `name, phone, email`; exactly three non-empty fields.
pub fn parse_contact(text: &str) -> Option<ContactInfo> {
    let fields: Vec<&str> = text.split(',').map(str::trim).collect();
    let [name, phone, email] = fields.as_slice() else {
        return None;
    };
    if name.is_empty() || phone.is_empty() || email.is_empty() {
        return None;
    }

    Some(ContactInfo {
        name: (*name).to_owned(),
        phone: (*phone).to_owned(),
        email: (*email).to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::{parse_contact, parse_dimensions, parse_quantity, DialogueEngine, DialoguePolicy};
    use crate::dialogue::states::{
        DialogueAction, DialogueReply, DialogueStage, Session, SessionChange,
    };
    use crate::domain::material::MaterialCatalog;
    use crate::pricing::CostCalculator;

    fn stored(change: SessionChange) -> Session {
        match change {
            SessionChange::Store(session) => session,
            other => panic!("expected stored session, got {other:?}"),
        }
    }

    fn walk(engine: &DialogueEngine, inputs: &[&str]) -> Option<Session> {
        let mut session = None;
        for input in inputs {
            let outcome = engine.apply(session.as_ref(), input);
            session = match outcome.session {
                SessionChange::Unchanged => session,
                SessionChange::Store(next) => Some(next),
                SessionChange::Remove => None,
            };
        }
        session
    }

    #[test]
    fn trigger_starts_session_with_material_prompt() {
        let engine = DialogueEngine::default();

        let outcome = engine.apply(None, " เริ่มคำนวณ ");

        assert_eq!(outcome.from, DialogueStage::NoSession);
        assert_eq!(outcome.to, DialogueStage::AwaitingMaterial);
        assert_eq!(stored(outcome.session), Session::AwaitingMaterial);
        assert!(matches!(
            outcome.reply,
            DialogueReply::MaterialPrompt { ref materials } if materials.len() == 10
        ));
    }

    #[test]
    fn trigger_resets_progress_at_any_step() {
        let engine = DialogueEngine::default();
        let session = walk(&engine, &["เริ่มคำนวณ", "PP", "10x10x10", "100"]).expect("session");
        assert_eq!(session.step(), 4);

        let outcome = engine.apply(Some(&session), "เริ่มคำนวณ");

        let reset = stored(outcome.session);
        assert_eq!(reset.step(), 1);
        assert!(reset.material().is_none());
        assert!(reset.dimensions().is_none());
    }

    #[test]
    fn message_without_session_asks_for_restart() {
        let engine = DialogueEngine::default();

        let outcome = engine.apply(None, "PP");

        assert_eq!(outcome.session, SessionChange::Unchanged);
        assert_eq!(outcome.reply, DialogueReply::NoActiveSession);
        assert_eq!(outcome.to, DialogueStage::NoSession);
    }

    #[test]
    fn unknown_material_keeps_step_one() {
        let engine = DialogueEngine::default();

        let outcome = engine.apply(Some(&Session::AwaitingMaterial), "XYZ");

        assert_eq!(outcome.session, SessionChange::Unchanged);
        assert_eq!(outcome.to, DialogueStage::AwaitingMaterial);
        assert!(matches!(outcome.reply, DialogueReply::InvalidMaterial { .. }));
    }

    #[test]
    fn lowercase_material_is_accepted() {
        let engine = DialogueEngine::default();

        let outcome = engine.apply(Some(&Session::AwaitingMaterial), "nylon");

        let next = stored(outcome.session);
        assert_eq!(next.step(), 2);
        assert_eq!(next.material().map(|m| m.name.as_str()), Some("Nylon"));
        assert_eq!(outcome.reply, DialogueReply::DimensionsPrompt);
    }

    #[test]
    fn two_dimension_tokens_reprompt_without_storing() {
        let engine = DialogueEngine::default();
        let session = walk(&engine, &["เริ่มคำนวณ", "PP"]).expect("session");

        let outcome = engine.apply(Some(&session), "10x10");

        assert_eq!(outcome.session, SessionChange::Unchanged);
        assert_eq!(outcome.reply, DialogueReply::InvalidDimensions);
        assert!(session.dimensions().is_none());
    }

    #[test]
    fn invalid_quantity_never_computes_cost() {
        let engine = DialogueEngine::default();
        let session = walk(&engine, &["เริ่มคำนวณ", "PP", "10x10x10"]).expect("session");

        for input in ["0", "-5", "abc", "1.5", ""] {
            let outcome = engine.apply(Some(&session), input);
            assert_eq!(outcome.session, SessionChange::Unchanged, "input {input:?}");
            assert_eq!(outcome.reply, DialogueReply::InvalidQuantity, "input {input:?}");
        }
    }

    #[test]
    fn quantity_produces_summary_with_estimate() {
        let engine = DialogueEngine::default();
        let session = walk(&engine, &["เริ่มคำนวณ", "PP", "10 x 10 x 10"]).expect("session");

        let outcome = engine.apply(Some(&session), "100");

        let DialogueReply::Summary { estimate } = &outcome.reply else {
            panic!("expected summary, got {:?}", outcome.reply);
        };
        assert!((estimate.total_cost - 7350.0).abs() < 1e-9);
        assert_eq!(stored(outcome.session).step(), 4);
    }

    #[test]
    fn non_affirmative_confirmation_keeps_step_four() {
        let engine = DialogueEngine::default();
        let session = walk(&engine, &["เริ่มคำนวณ", "ABS", "5x5x5", "10"]).expect("session");

        let outcome = engine.apply(Some(&session), "maybe");

        assert_eq!(outcome.session, SessionChange::Unchanged);
        assert_eq!(outcome.reply, DialogueReply::ConfirmationReprompt);
        assert_eq!(outcome.to, DialogueStage::AwaitingConfirmation);
    }

    #[test]
    fn affirmative_moves_to_contact_collection() {
        let engine = DialogueEngine::default();
        let session = walk(&engine, &["เริ่มคำนวณ", "ABS", "5x5x5", "10"]).expect("session");

        let outcome = engine.apply(Some(&session), "YES");

        assert_eq!(stored(outcome.session).step(), 5);
        assert_eq!(outcome.reply, DialogueReply::ContactPrompt);
        assert!(outcome.action.is_none());
    }

    #[test]
    fn affirmative_completes_when_contact_collection_is_off() {
        let engine = DialogueEngine::new(
            MaterialCatalog::standard(),
            CostCalculator::default(),
            DialoguePolicy { collect_contact_info: false, ..DialoguePolicy::default() },
        );
        let session = walk(&engine, &["เริ่มคำนวณ", "ABS", "5x5x5", "10"]).expect("session");

        let outcome = engine.apply(Some(&session), "ใช่");

        assert_eq!(outcome.session, SessionChange::Remove);
        assert_eq!(outcome.reply, DialogueReply::Completed);
        assert!(matches!(
            outcome.action,
            Some(DialogueAction::PersistQuotation { contact: None, ref estimate })
                if (estimate.total_cost - 262.5).abs() < 1e-9
        ));
    }

    #[test]
    fn contact_info_completes_dialogue() {
        let engine = DialogueEngine::default();
        let session =
            walk(&engine, &["เริ่มคำนวณ", "PP", "10x10x10", "100", "ขอใบเสนอราคา"]).expect("session");

        let outcome = engine.apply(Some(&session), " Somchai , 0812345678 , s@example.com ");

        assert_eq!(outcome.session, SessionChange::Remove);
        assert_eq!(outcome.to, DialogueStage::NoSession);
        let Some(DialogueAction::PersistQuotation { contact: Some(contact), .. }) = outcome.action
        else {
            panic!("expected persist action with contact");
        };
        assert_eq!(contact.name, "Somchai");
        assert_eq!(contact.phone, "0812345678");
        assert_eq!(contact.email, "s@example.com");
    }

    #[test]
    fn malformed_contact_info_reprompts() {
        let engine = DialogueEngine::default();
        let session =
            walk(&engine, &["เริ่มคำนวณ", "PP", "10x10x10", "100", "yes"]).expect("session");

        for input in ["Somchai, 0812345678", "a, b, c, d", " , 081, x@y"] {
            let outcome = engine.apply(Some(&session), input);
            assert_eq!(outcome.session, SessionChange::Unchanged, "input {input:?}");
            assert_eq!(outcome.reply, DialogueReply::InvalidContact);
        }
    }

    #[test]
    fn cancel_phrase_abandons_active_session() {
        let engine = DialogueEngine::default();
        let session = walk(&engine, &["เริ่มคำนวณ", "PP"]).expect("session");

        let outcome = engine.apply(Some(&session), "ยกเลิก");

        assert_eq!(outcome.session, SessionChange::Remove);
        assert_eq!(outcome.reply, DialogueReply::Cancelled);
    }

    #[test]
    fn cancel_without_session_is_treated_as_stray_message() {
        let engine = DialogueEngine::default();

        let outcome = engine.apply(None, "cancel");

        assert_eq!(outcome.reply, DialogueReply::NoActiveSession);
    }

    #[test]
    fn non_positive_dimensions_follow_policy() {
        let lenient = DialogueEngine::default();
        let strict = DialogueEngine::new(
            MaterialCatalog::standard(),
            CostCalculator::default(),
            DialoguePolicy { reject_non_positive_dimensions: true, ..DialoguePolicy::default() },
        );
        let session = walk(&lenient, &["เริ่มคำนวณ", "PP"]).expect("session");

        assert!(matches!(lenient.apply(Some(&session), "0x10x10").session, SessionChange::Store(_)));
        assert_eq!(strict.apply(Some(&session), "0x10x10").reply, DialogueReply::InvalidDimensions);
    }

    #[test]
    fn dimension_parser_handles_spacing_and_case() {
        let dimensions = parse_dimensions(" 10.5 X 15.5 x 5.5 ").expect("dimensions");
        assert_eq!(dimensions.width_cm, 10.5);
        assert_eq!(dimensions.length_cm, 15.5);
        assert_eq!(dimensions.height_cm, 5.5);

        assert!(parse_dimensions("10x10").is_none());
        assert!(parse_dimensions("10x10x10x10").is_none());
        assert!(parse_dimensions("10xax10").is_none());
        assert!(parse_dimensions("10xx10").is_none());
        assert!(parse_dimensions("nanx1x1").is_none());
        assert!(parse_dimensions("").is_none());
        assert!(parse_dimensions("1e200x1e200x1e200").is_none());
    }

    #[test]
    fn overflowing_dimensions_reprompt_without_storing() {
        let engine = DialogueEngine::default();
        let session = walk(&engine, &["เริ่มคำนวณ", "PP"]).expect("session");

        let outcome = engine.apply(Some(&session), "1e200x1e200x1e200");

        assert_eq!(outcome.session, SessionChange::Unchanged);
        assert_eq!(outcome.reply, DialogueReply::InvalidDimensions);
        assert_eq!(outcome.to, DialogueStage::AwaitingDimensions);
    }

    #[test]
    fn quantity_that_overflows_total_cost_is_rejected() {
        let engine = DialogueEngine::default();
        let session = walk(&engine, &["เริ่มคำนวณ", "PU", "1e100x1e100x1e100"]).expect("session");
        assert_eq!(session.step(), 3);

        let outcome = engine.apply(Some(&session), "4000000000");

        assert_eq!(outcome.session, SessionChange::Unchanged);
        assert_eq!(outcome.reply, DialogueReply::InvalidQuantity);
    }

    #[test]
    fn quantity_parser_accepts_only_positive_integers() {
        assert_eq!(parse_quantity(" 100 "), Some(100));
        assert_eq!(parse_quantity("+7"), Some(7));
        assert_eq!(parse_quantity("0"), None);
        assert_eq!(parse_quantity("-1"), None);
        assert_eq!(parse_quantity("ten"), None);
        assert_eq!(parse_quantity("4294967295"), Some(u32::MAX));
        assert_eq!(parse_quantity("4294967296"), None);
        assert_eq!(parse_quantity("99999999999"), None);
    }

    #[test]
    fn contact_parser_requires_three_fields() {
        assert!(parse_contact("a,b,c").is_some());
        assert!(parse_contact("a,b").is_none());
        assert!(parse_contact("a,,c").is_none());
    }
}
