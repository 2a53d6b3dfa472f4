//! Interference rule lookup
//!
//! A pure scan over the immutable rule list; the first rule that applies wins.

use study_model::{
    Country, EmissionMask, FrequencyOffset, InterferenceRule, OffsetRelation, ServiceType,
    Station,
};

/// Everything a rule is keyed on, for one desired/undesired/delta combination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleQuery {
    pub country: Country,
    pub desired_service: ServiceType,
    pub undesired_service: ServiceType,
    pub channel_delta: i32,
    /// Desired channel
    pub channel: u16,
    pub desired_offset: Option<FrequencyOffset>,
    pub undesired_offset: Option<FrequencyOffset>,
    pub emission_mask: Option<EmissionMask>,
}

impl RuleQuery {
    /// Query for `undesired` interfering with `desired` on `channel`
    ///
    /// The undesired side is matched as the digital station it is, or would
    /// become after replication.
    pub fn for_pair(
        desired: &Station,
        undesired: &Station,
        channel: u16,
        channel_delta: i32,
    ) -> Self {
        let u = undesired.digital_identity();
        Self {
            country: desired.country,
            desired_service: desired.service,
            undesired_service: u.service,
            channel_delta,
            channel,
            desired_offset: desired.frequency_offset,
            undesired_offset: u.frequency_offset,
            emission_mask: u.emission_mask,
        }
    }
}

/// Keep only digital-to-digital rules for deltas -1, 0 and +1
pub fn pair_study_rules(rules: &[InterferenceRule]) -> Vec<InterferenceRule> {
    rules
        .iter()
        .filter(|r| r.is_pair_study_rule())
        .cloned()
        .collect()
}

fn offsets_satisfy(
    relation: OffsetRelation,
    desired: Option<FrequencyOffset>,
    undesired: Option<FrequencyOffset>,
) -> bool {
    match relation {
        OffsetRelation::Any => true,
        OffsetRelation::With => matches!((desired, undesired), (Some(a), Some(b)) if a == b),
        OffsetRelation::Without => !matches!((desired, undesired), (Some(a), Some(b)) if a != b),
    }
}

pub fn rule_applies(rule: &InterferenceRule, query: &RuleQuery) -> bool {
    rule.country == query.country
        && rule.desired_service == query.desired_service
        && rule.undesired_service == query.undesired_service
        && rule.channel_delta == query.channel_delta
        && rule.channels.contains(query.channel)
        && offsets_satisfy(rule.offset_relation, query.desired_offset, query.undesired_offset)
        && rule
            .emission_mask
            .map_or(true, |mask| query.emission_mask == Some(mask))
}

pub fn match_rule<'a>(
    rules: &'a [InterferenceRule],
    query: &RuleQuery,
) -> Option<&'a InterferenceRule> {
    rules.iter().find(|r| rule_applies(r, query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{rule, station};
    use proptest::prelude::*;
    use study_model::ChannelRange;

    fn query(delta: i32) -> RuleQuery {
        RuleQuery {
            country: Country::Us,
            desired_service: ServiceType::Dt,
            undesired_service: ServiceType::Dt,
            channel_delta: delta,
            channel: 20,
            desired_offset: None,
            undesired_offset: None,
            emission_mask: None,
        }
    }

    #[test]
    fn test_exact_key_match() {
        let rules = vec![rule(-1, 50.0), rule(0, 100.0), rule(1, 60.0)];
        assert_eq!(match_rule(&rules, &query(0)).map(|r| r.max_distance_km), Some(100.0));
        assert_eq!(match_rule(&rules, &query(1)).map(|r| r.max_distance_km), Some(60.0));

        let mut q = query(0);
        q.country = Country::Mx;
        assert!(match_rule(&rules, &q).is_none());

        let mut q = query(0);
        q.undesired_service = ServiceType::Ld;
        assert!(match_rule(&rules, &q).is_none());
    }

    #[test]
    fn test_channel_range() {
        let mut r = rule(0, 100.0);
        r.channels = ChannelRange::new(2, 13);
        assert!(match_rule(&[r], &query(0)).is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let rules = vec![rule(0, 100.0), rule(0, 250.0)];
        assert_eq!(match_rule(&rules, &query(0)).map(|r| r.max_distance_km), Some(100.0));
    }

    #[test]
    fn test_offset_relations() {
        use FrequencyOffset::*;
        assert!(offsets_satisfy(OffsetRelation::Any, Some(Plus), Some(Minus)));

        assert!(offsets_satisfy(OffsetRelation::With, Some(Plus), Some(Plus)));
        assert!(!offsets_satisfy(OffsetRelation::With, Some(Plus), Some(Minus)));
        assert!(!offsets_satisfy(OffsetRelation::With, None, Some(Plus)));
        assert!(!offsets_satisfy(OffsetRelation::With, None, None));

        assert!(offsets_satisfy(OffsetRelation::Without, None, None));
        assert!(offsets_satisfy(OffsetRelation::Without, Some(Zero), None));
        assert!(offsets_satisfy(OffsetRelation::Without, Some(Zero), Some(Zero)));
        assert!(!offsets_satisfy(OffsetRelation::Without, Some(Zero), Some(Plus)));
    }

    #[test]
    fn test_emission_mask_requirement() {
        let mut r = rule(0, 100.0);
        r.undesired_service = ServiceType::Ld;
        r.emission_mask = Some(EmissionMask::Stringent);

        let mut q = query(0);
        q.undesired_service = ServiceType::Ld;
        assert!(!rule_applies(&r, &q));
        q.emission_mask = Some(EmissionMask::Simple);
        assert!(!rule_applies(&r, &q));
        q.emission_mask = Some(EmissionMask::Stringent);
        assert!(rule_applies(&r, &q));
    }

    #[test]
    fn test_analog_undesired_matched_as_digital_counterpart() {
        let desired = station(100, 20, 40.0, -75.0);
        let mut undesired = station(200, 20, 40.5, -75.0);
        undesired.service = ServiceType::Lp;
        undesired.frequency_offset = Some(FrequencyOffset::Plus);

        let mut r = rule(0, 100.0);
        r.undesired_service = ServiceType::Ld;
        r.emission_mask = Some(EmissionMask::Simple);
        let analog_rule = {
            let mut a = rule(0, 300.0);
            a.undesired_service = ServiceType::Lp;
            a
        };
        let rules = vec![analog_rule, r];

        let q = RuleQuery::for_pair(&desired, &undesired, 20, 0);
        assert_eq!(q.undesired_service, ServiceType::Ld);
        assert_eq!(q.undesired_offset, None);
        assert_eq!(match_rule(&rules, &q).map(|r| r.max_distance_km), Some(100.0));
    }

    #[test]
    fn test_pair_study_rules_filter() {
        let mut analog = rule(0, 100.0);
        analog.desired_service = ServiceType::Tv;
        let taboo = rule(3, 30.0);
        let kept = pair_study_rules(&[analog, rule(-1, 40.0), taboo, rule(0, 100.0)]);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|r| r.is_pair_study_rule()));
    }

    fn arb_offset() -> impl Strategy<Value = Option<FrequencyOffset>> {
        prop_oneof![
            Just(None),
            Just(Some(FrequencyOffset::Zero)),
            Just(Some(FrequencyOffset::Plus)),
            Just(Some(FrequencyOffset::Minus)),
        ]
    }

    proptest! {
        #[test]
        fn prop_matching_is_deterministic(
            delta in -1i32..=1,
            channel in 2u16..=51,
            d_off in arb_offset(),
            u_off in arb_offset(),
            limits in proptest::collection::vec(10.0f64..300.0, 1..8),
        ) {
            let rules: Vec<_> = limits
                .iter()
                .enumerate()
                .map(|(i, &km)| {
                    let mut r = rule(i as i32 % 3 - 1, km);
                    r.offset_relation = match i % 3 {
                        0 => OffsetRelation::Any,
                        1 => OffsetRelation::With,
                        _ => OffsetRelation::Without,
                    };
                    r
                })
                .collect();
            let mut q = query(delta);
            q.channel = channel;
            q.desired_offset = d_off;
            q.undesired_offset = u_off;

            let first = match_rule(&rules, &q).map(|r| r as *const InterferenceRule);
            let second = match_rule(&rules, &q).map(|r| r as *const InterferenceRule);
            prop_assert_eq!(first, second);
        }
    }
}
