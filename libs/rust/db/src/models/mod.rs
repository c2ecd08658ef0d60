pub mod announced_proposal;
