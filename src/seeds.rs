//! Built-in scenario bank so the trainer is useful without external config or OpenAI.

use serde::Deserialize;

use crate::domain::{SpinType, Vertical};

/// One prospect situation with an example discovery question of a given type.
#[derive(Clone, Debug, Deserialize)]
pub struct SeedScenario {
  pub vertical: Vertical,
  pub spin_type: SpinType,
  pub context: String,
  pub persona: String,
  pub prospect_statement: String,
  pub sample_question: String,
}

fn seed(vertical: Vertical, spin_type: SpinType, context: &str, persona: &str, statement: &str, sample: &str) -> SeedScenario {
  SeedScenario {
    vertical,
    spin_type,
    context: context.into(),
    persona: persona.into(),
    prospect_statement: statement.into(),
    sample_question: sample.into(),
  }
}

pub fn seed_scenarios() -> Vec<SeedScenario> {
  use SpinType::*;
  use Vertical::*;
  vec![
    seed(Ecommerce, S,
      "You are on a first call with the owner of a Shopify store selling outdoor gear.",
      "Dana, founder, runs marketing herself with one part-time assistant.",
      "We do most of our sales through the website, some through Amazon.",
      "Roughly what share of your monthly revenue comes from the website versus Amazon?"),
    seed(Ecommerce, P,
      "The prospect sells handmade skincare online and has mentioned paid ads.",
      "Priya, e-commerce manager, reports to the CEO on ad spend every week.",
      "Our ad costs keep climbing but sales are flat.",
      "What makes it hardest to keep acquisition costs under control right now?"),
    seed(Ecommerce, I,
      "A furniture retailer has a high cart-abandonment rate on mobile.",
      "Marco, head of digital, owns the conversion targets for the year.",
      "A lot of people add to cart on their phones and then just leave.",
      "How does that mobile drop-off affect the revenue target you committed to this year?"),
    seed(Ecommerce, N,
      "A pet-food subscription brand is losing subscribers after the second box.",
      "Lena, retention lead, was hired to fix churn this quarter.",
      "If we could keep people past month two we'd be in great shape.",
      "How valuable would it be if you could keep even a third more subscribers past month two?"),
    seed(Leadgen, S,
      "You are calling a B2B software company that buys leads for its sales team.",
      "Tom, VP of sales, manages twelve SDRs.",
      "We get leads from a couple of vendors and our own webinars.",
      "How many leads does your team typically work through in a week?"),
    seed(Leadgen, P,
      "A solar installer buys exclusive leads but complains about contact rates.",
      "Grace, sales manager, runs a call center of eight reps.",
      "Half the leads we buy never pick up the phone.",
      "What's the biggest frustration your reps have with the leads they're getting?"),
    seed(Leadgen, I,
      "An insurance agency's reps spend hours qualifying poor leads.",
      "Omar, agency owner, pays reps a base salary plus commission.",
      "My guys waste a lot of time on people who were never going to buy.",
      "What does all that time on unqualified leads end up costing you in closed policies each month?"),
    seed(Leadgen, N,
      "A mortgage broker wants a steadier pipeline between seasons.",
      "Keisha, broker, is planning to hire two loan officers.",
      "Our pipeline is feast or famine depending on the season.",
      "If your pipeline were steady year-round, how would that change your hiring plans?"),
    seed(LocalServices, S,
      "You are speaking with a family-owned HVAC company in a mid-size city.",
      "Rick, owner, still answers the phones himself on weekends.",
      "Most of our work comes from word of mouth and some Google ads.",
      "How are new customers finding you today besides word of mouth?"),
    seed(LocalServices, P,
      "A dental practice has gaps in its schedule most weeks.",
      "Dr. Alvarez, practice owner, has two hygienists on payroll.",
      "We always seem to have empty chairs on Tuesdays and Wednesdays.",
      "What's making it difficult to fill those mid-week appointments?"),
    seed(LocalServices, I,
      "A landscaping business loses crews to competitors every spring.",
      "Jess, operations manager, handles hiring and scheduling.",
      "We lose good guys every year right when it gets busy.",
      "When you lose crews at the start of the season, what happens to the jobs you've already booked?"),
    seed(LocalServices, N,
      "A plumbing company misses calls after hours.",
      "Sam, owner, gets voicemails he can't return until morning.",
      "I know we lose jobs when nobody picks up at night.",
      "How would it help your business if every after-hours call got answered and booked?"),
  ]
}

/// Unexpected prospect turns used for curveball prompts.
pub fn curveball_statement(vertical: Vertical) -> &'static str {
  match vertical {
    Vertical::Ecommerce => "Honestly, we tried an agency last year and it was a waste of money.",
    Vertical::Leadgen => "Your competitor just offered us leads at half your price.",
    Vertical::LocalServices => "We're busy enough already, I don't really need more customers.",
  }
}

/// Absolute last resort when no bank entry matches.
pub fn hard_fallback_scenario(vertical: Vertical, spin_type: SpinType) -> SeedScenario {
  seed(
    vertical,
    spin_type,
    "You are on a discovery call with a small business owner.",
    "Alex, owner, makes every purchasing decision.",
    "Things are going fine, but growth has slowed down this year.",
    "What has changed in the business since growth started to slow?",
  )
}

/// One short coaching hint per SPIN type.
pub fn type_hint(t: SpinType) -> &'static str {
  match t {
    SpinType::S => "Situation questions gather facts about how things work today.",
    SpinType::P => "Problem questions uncover difficulties, dissatisfactions or frustrations.",
    SpinType::I => "Implication questions explore the consequences and cost of a problem.",
    SpinType::N => "Need-payoff questions get the prospect to state the value of a solution.",
  }
}
