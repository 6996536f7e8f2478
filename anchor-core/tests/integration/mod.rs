mod anchor_flow;
mod orchestrator;
mod worker;
